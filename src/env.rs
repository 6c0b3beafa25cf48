// SPDX-License-Identifier: MIT
//! Typed readers for configuration environment variables.
//!
//! Unset or empty variables fall back to the supplied default. Defaults for
//! duration and size readers are strings and go through the same parser as
//! the environment value, so `"10s"` and `"16KB"` read naturally at call sites.
//! A value that fails to parse is an error; nothing is silently replaced.
use std::env::{self, VarError};
use std::time::Duration;

use tracing::debug;

use crate::error::{ConfigError, ValidationError};
use crate::units::{parse_duration, parse_size};

fn raw_var(name: &str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode {
            name: name.to_string(),
        }),
    }
}

fn invalid(name: &str) -> impl FnOnce(ValidationError) -> ConfigError + '_ {
    move |source| ConfigError::InvalidVar {
        name: name.to_string(),
        source,
    }
}

/// Read a duration variable such as `LOGSHIP_EXPORT_TIMEOUT=1m30s`.
///
/// # Errors
/// [`ConfigError::InvalidVar`] when the value (or the default) does not parse,
/// [`ConfigError::NotUnicode`] when the value is not unicode.
pub fn duration_var(name: &str, default: &str) -> Result<Duration, ConfigError> {
    let raw = raw_var(name)?;
    let seconds = parse_duration(raw.as_deref().unwrap_or(default)).map_err(invalid(name))?;
    debug!(var = name, seconds, from_env = raw.is_some(), "resolved duration");
    Ok(Duration::from_secs(seconds))
}

/// Read a size variable such as `LOGSHIP_MAX_RECORD_SIZE=64KB`, in bytes.
///
/// # Errors
/// Same as [`duration_var`].
pub fn size_var(name: &str, default: &str) -> Result<u64, ConfigError> {
    let raw = raw_var(name)?;
    let bytes = parse_size(raw.as_deref().unwrap_or(default)).map_err(invalid(name))?;
    debug!(var = name, bytes, from_env = raw.is_some(), "resolved size");
    Ok(bytes)
}

/// Read a boolean flag. Accepts `1/true/yes/on` and `0/false/no/off`.
///
/// # Errors
/// [`ConfigError::InvalidVar`] with [`crate::Rule::Flag`] for anything else.
pub fn flag_var(name: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw_var(name)? else {
        return Ok(default);
    };
    let flag = match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => return Err(invalid(name)(ValidationError::flag(&raw))),
    };
    debug!(var = name, flag, "resolved flag");
    Ok(flag)
}

/// Read a string variable, falling back to `default`.
///
/// # Errors
/// [`ConfigError::NotUnicode`] when the value is not unicode.
pub fn string_var(name: &str, default: &str) -> Result<String, ConfigError> {
    let raw = raw_var(name)?;
    let from_env = raw.is_some();
    let value = raw.unwrap_or_else(|| default.to_string());
    debug!(var = name, value = %value, from_env, "resolved string");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rule;
    use serial_test::serial;

    struct VarGuard(&'static str);

    impl VarGuard {
        fn set(name: &'static str, value: &str) -> Self {
            env::set_var(name, value);
            Self(name)
        }
    }

    impl Drop for VarGuard {
        fn drop(&mut self) {
            env::remove_var(self.0);
        }
    }

    #[test]
    #[serial]
    fn unset_vars_use_defaults() {
        env::remove_var("LOGSHIP_TEST_UNSET");
        assert_eq!(
            duration_var("LOGSHIP_TEST_UNSET", "1h30m").unwrap(),
            Duration::from_secs(5400)
        );
        assert_eq!(size_var("LOGSHIP_TEST_UNSET", "16KB").unwrap(), 16 * 1024);
        assert!(flag_var("LOGSHIP_TEST_UNSET", true).unwrap());
        assert_eq!(string_var("LOGSHIP_TEST_UNSET", "dev").unwrap(), "dev");
    }

    #[test]
    #[serial]
    fn empty_vars_use_defaults() {
        let _guard = VarGuard::set("LOGSHIP_TEST_EMPTY", "");
        assert_eq!(
            duration_var("LOGSHIP_TEST_EMPTY", "5s").unwrap(),
            Duration::from_secs(5)
        );
        assert!(!flag_var("LOGSHIP_TEST_EMPTY", false).unwrap());
    }

    #[test]
    #[serial]
    fn env_values_override_defaults() {
        let _timeout = VarGuard::set("LOGSHIP_TEST_TIMEOUT", "2m");
        let _size = VarGuard::set("LOGSHIP_TEST_SIZE", "1.5MB");
        let _flag = VarGuard::set("LOGSHIP_TEST_FLAG", "Off");
        let _name = VarGuard::set("LOGSHIP_TEST_NAME", "edge");
        assert_eq!(
            duration_var("LOGSHIP_TEST_TIMEOUT", "10s").unwrap(),
            Duration::from_secs(120)
        );
        assert_eq!(
            size_var("LOGSHIP_TEST_SIZE", "1KB").unwrap(),
            1024 * 1024 + 512 * 1024
        );
        assert!(!flag_var("LOGSHIP_TEST_FLAG", true).unwrap());
        assert_eq!(string_var("LOGSHIP_TEST_NAME", "dev").unwrap(), "edge");
    }

    #[test]
    #[serial]
    fn string_var_logs_resolved_value() {
        use crate::stream::LogStream;
        use parking_lot::Mutex;
        use std::io::{self, Write};
        use std::sync::Arc;

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl Write for Captured {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(LogStream::new(captured.clone()))
            .finish();
        let _guard = VarGuard::set("LOGSHIP_TEST_NAME", "edge");
        let value = tracing::subscriber::with_default(subscriber, || {
            string_var("LOGSHIP_TEST_NAME", "dev")
        })
        .unwrap();
        assert_eq!(value, "edge");

        let out = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(out.contains("resolved string"), "{out}");
        assert!(out.contains("value=edge"), "{out}");
        assert!(out.contains("from_env=true"), "{out}");
    }

    #[test]
    #[serial]
    fn invalid_values_name_the_variable() {
        let _guard = VarGuard::set("LOGSHIP_TEST_BAD", "soon");
        match duration_var("LOGSHIP_TEST_BAD", "10s") {
            Err(ConfigError::InvalidVar { name, source }) => {
                assert_eq!(name, "LOGSHIP_TEST_BAD");
                assert_eq!(source.rule, Rule::Duration);
                assert_eq!(source.value, "soon");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match size_var("LOGSHIP_TEST_BAD", "1KB") {
            Err(ConfigError::InvalidVar { source, .. }) => assert_eq!(source.rule, Rule::Size),
            other => panic!("unexpected result: {other:?}"),
        }
        match flag_var("LOGSHIP_TEST_BAD", true) {
            Err(ConfigError::InvalidVar { source, .. }) => assert_eq!(source.rule, Rule::Flag),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn invalid_default_is_reported() {
        env::remove_var("LOGSHIP_TEST_UNSET");
        assert!(matches!(
            size_var("LOGSHIP_TEST_UNSET", "lots"),
            Err(ConfigError::InvalidVar { .. })
        ));
    }
}
