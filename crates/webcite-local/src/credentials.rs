use webcite_core::{Error, Result};

/// First non-empty value among `names` (whitespace-only counts as unset).
pub fn env_value(names: &[&str]) -> Option<String> {
    names.iter().find_map(|k| {
        std::env::var(k)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

pub fn env_is_set(names: &[&str]) -> bool {
    env_value(names).is_some()
}

/// Explicit key if given, else the environment, else `NotConfigured`.
///
/// Called per request, so a key exported after the backend was built is
/// still picked up.
pub fn resolve_api_key(explicit: Option<&str>, env_names: &[&str]) -> Result<String> {
    if let Some(k) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(k.to_string());
    }
    env_value(env_names).ok_or_else(|| Error::NotConfigured(missing_message(env_names)))
}

fn missing_message(env_names: &[&str]) -> String {
    match env_names {
        [] => "missing api key".to_string(),
        [only] => format!("missing {only}"),
        [first, rest @ ..] => format!("missing {first} (or {})", rest.join(", ")),
    }
}

#[cfg(test)]
pub(crate) mod test_env {
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that touch them.
    pub static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub struct EnvGuard {
        k: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        pub fn set(k: &'static str, v: &str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::set_var(k, v);
            Self { k, prev }
        }

        pub fn unset(k: &'static str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::remove_var(k);
            Self { k, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(v) = self.prev.take() {
                std::env::set_var(self.k, v);
            } else {
                std::env::remove_var(self.k);
            }
        }
    }
}
