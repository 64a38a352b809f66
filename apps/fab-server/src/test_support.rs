pub mod env {
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Serializes env-dependent tests and rolls back every variable it
    /// touched when dropped.
    pub struct EnvGuard {
        _held: MutexGuard<'static, ()>,
        previous: HashMap<&'static str, Option<String>>,
    }

    pub fn guard() -> EnvGuard {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        EnvGuard {
            _held: lock.lock().expect("env lock"),
            previous: HashMap::new(),
        }
    }

    impl EnvGuard {
        pub fn set(&mut self, key: &'static str, value: &str) {
            self.previous
                .entry(key)
                .or_insert_with(|| std::env::var(key).ok());
            std::env::set_var(key, value);
        }

        pub fn remove(&mut self, key: &'static str) {
            self.previous
                .entry(key)
                .or_insert_with(|| std::env::var(key).ok());
            std::env::remove_var(key);
        }

        pub fn clear_keys(&mut self, keys: &[&'static str]) {
            for &key in keys {
                self.remove(key);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.previous.drain() {
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
