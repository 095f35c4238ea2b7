//! Job status enum mapping to the SMALLINT `job_statuses` lookup table.
//!
//! Variant discriminants match the seed data order (1-based) in the
//! database migration.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

/// Analysis job lifecycle status.
///
/// Once a job reaches a terminal status it never transitions again; the
/// repository enforces this with conditional UPDATE guards.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued = 1,
    Running = 2,
    Done = 3,
    Error = 4,
    TimedOut = 5,
}

/// Terminal statuses: done, error, timed_out.
pub const TERMINAL_STATUSES: [StatusId; 3] = [
    JobStatus::Done as StatusId,
    JobStatus::Error as StatusId,
    JobStatus::TimedOut as StatusId,
];

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Map a raw status ID back to the enum. Returns `None` for IDs that
    /// do not exist in the lookup table (e.g. a row written by a newer
    /// schema version).
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Queued),
            2 => Some(Self::Running),
            3 => Some(Self::Done),
            4 => Some(Self::Error),
            5 => Some(Self::TimedOut),
            _ => None,
        }
    }

    /// Whether this status is terminal (done, error, timed_out).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::TimedOut)
    }
}

impl From<JobStatus> for StatusId {
    fn from(value: JobStatus) -> Self {
        value as StatusId
    }
}
