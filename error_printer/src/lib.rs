use std::fmt::{Debug, Display};
use std::panic::Location;

use tracing::{debug, error, info, warn};

/// A helper trait to log errors as they pass through a `Result`.
///
/// The result is returned unchanged so calls can be chained with `?`:
///
/// ```ignore
/// let data = std::fs::read(path).log_error("failed to read index")?;
/// ```
pub trait ErrorPrinter {
    fn log_error<M: Display>(self, message: M) -> Self;

    fn warn_error<M: Display>(self, message: M) -> Self;

    fn debug_error<M: Display>(self, message: M) -> Self;

    fn info_error<M: Display>(self, message: M) -> Self;
}

impl<T, E: Debug> ErrorPrinter for Result<T, E> {
    #[track_caller]
    fn log_error<M: Display>(self, message: M) -> Self {
        if let Err(ref e) = self {
            let caller = Location::caller();
            error!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }

    #[track_caller]
    fn warn_error<M: Display>(self, message: M) -> Self {
        if let Err(ref e) = self {
            let caller = Location::caller();
            warn!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }

    #[track_caller]
    fn debug_error<M: Display>(self, message: M) -> Self {
        if let Err(ref e) = self {
            let caller = Location::caller();
            debug!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }

    #[track_caller]
    fn info_error<M: Display>(self, message: M) -> Self {
        if let Err(ref e) = self {
            let caller = Location::caller();
            info!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }
}

/// Same idea as [`ErrorPrinter`] but for `Option`s, logging when the value is `None`.
pub trait OptionPrinter {
    fn error_none<M: Display>(self, message: M) -> Self;

    fn warn_none<M: Display>(self, message: M) -> Self;

    fn debug_none<M: Display>(self, message: M) -> Self;

    fn info_none<M: Display>(self, message: M) -> Self;
}

impl<T> OptionPrinter for Option<T> {
    #[track_caller]
    fn error_none<M: Display>(self, message: M) -> Self {
        if self.is_none() {
            error!(caller = %Location::caller(), "{message}");
        }
        self
    }

    #[track_caller]
    fn warn_none<M: Display>(self, message: M) -> Self {
        if self.is_none() {
            warn!(caller = %Location::caller(), "{message}");
        }
        self
    }

    #[track_caller]
    fn debug_none<M: Display>(self, message: M) -> Self {
        if self.is_none() {
            debug!(caller = %Location::caller(), "{message}");
        }
        self
    }

    #[track_caller]
    fn info_none<M: Display>(self, message: M) -> Self {
        if self.is_none() {
            info!(caller = %Location::caller(), "{message}");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn test_error_is_logged_and_passed_through() {
        let r: Result<u32, String> = Err("disk on fire".to_owned());
        let r = r.log_error("failed to write chunk");

        assert!(r.is_err());
        assert!(logs_contain("failed to write chunk"));
        assert!(logs_contain("disk on fire"));
    }

    #[test]
    #[traced_test]
    fn test_ok_is_silent() {
        let r: Result<u32, String> = Ok(7);
        assert_eq!(r.warn_error("should not appear").unwrap(), 7);
        assert!(!logs_contain("should not appear"));
    }

    #[test]
    #[traced_test]
    fn test_none_is_logged() {
        let v: Option<u32> = None;
        assert!(v.info_none("auth disabled").is_none());
        assert!(logs_contain("auth disabled"));

        assert_eq!(Some(3).warn_none("missing").unwrap(), 3);
        assert!(!logs_contain("missing"));
    }
}
