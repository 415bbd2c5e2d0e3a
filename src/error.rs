use std::process;

/// Exit codes of the unrecoverable error classes. Recoverable conditions
/// (out-of-domain particles, annihilated cells) are status returns instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    MemoryError = 1,
    FileError = 2,
    InternalError = 3,
    CommandLineError = 4,
}

/// Logs a fatal error and terminates the process with the exit code of the
/// error class.
pub fn fatal_error(message: &str, code: ExitCode) -> ! {
    log::error!("{}", message);
    process::exit(code as i32);
}
