//! Exit code constants for the subagent CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, unknown review type, unknown session)
//! - 2: Environment preflight failure (missing required variables)
//! - 3: Agent binary could not be launched
//! - 4: Agent exited with a non-zero status
//! - 5: Agent timed out
//! - 6: Agent run was cancelled

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or malformed request.
pub const USER_ERROR: i32 = 1;

/// Required environment variables are missing.
pub const ENVIRONMENT_ERROR: i32 = 2;

/// The agent binary was not found or is not executable.
pub const SPAWN_FAILURE: i32 = 3;

/// The agent process exited unsuccessfully.
pub const AGENT_FAILURE: i32 = 4;

/// The agent process exceeded its wall-clock budget.
pub const TIMEOUT: i32 = 5;

/// The agent run was cancelled (Ctrl-C or client request).
pub const CANCELLED: i32 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            ENVIRONMENT_ERROR,
            SPAWN_FAILURE,
            AGENT_FAILURE,
            TIMEOUT,
            CANCELLED,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
