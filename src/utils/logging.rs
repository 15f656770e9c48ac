//! Logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! A module opts in by defining the flag and importing the macros from the
//! crate root:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn};
//!
//! log_info!("[session] detector started");
//! ```
//! Setting the flag to `false` silences a chatty module without touching the
//! global `env_logger` filter. Arguments are not evaluated while it is off.

/// Logs at a `log::Level` chosen by the caller when the calling module's
/// `ENABLE_LOGS` is set. The level-named macros below all expand to this.
#[macro_export]
macro_rules! log_gated {
    ($level:expr, $($arg:tt)+) => {
        if ENABLE_LOGS {
            log::log!($level, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => {
        $crate::log_gated!(log::Level::Debug, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => {
        $crate::log_gated!(log::Level::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => {
        $crate::log_gated!(log::Level::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => {
        $crate::log_gated!(log::Level::Error, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    mod silenced {
        pub const ENABLE_LOGS: bool = false;

        pub fn log_everything(evaluated: &super::Cell<u32>) {
            let touch = || {
                evaluated.set(evaluated.get() + 1);
                "payload"
            };
            crate::log_debug!("{}", touch());
            crate::log_info!("{}", touch());
            crate::log_warn!("{}", touch());
            crate::log_error!("{}", touch());
            crate::log_gated!(log::Level::Trace, "{}", touch());
        }
    }

    #[test]
    fn test_disabled_module_skips_arguments() {
        let evaluated = Cell::new(0);
        silenced::log_everything(&evaluated);
        assert_eq!(evaluated.get(), 0);
    }
}
