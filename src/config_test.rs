use super::*;
use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// # Safety
/// Callers must hold [`env_guard`] so env mutations do not race.
unsafe fn clear_stack_env() {
    unsafe {
        std::env::remove_var("STACK_HOSTNAME");
        std::env::remove_var("STACK_SECURE");
        std::env::remove_var("STACK_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("STACK_PING_INTERVAL_SECS");
        std::env::remove_var("STACK_PING_TIMEOUT_SECS");
        std::env::remove_var("STACK_HEADERS");
    }
}

#[test]
fn new_uses_secure_defaults() {
    let cfg = ClientConfig::new("stack.test/");
    assert_eq!(cfg.hostname, "stack.test");
    assert!(cfg.secure);
    assert!(cfg.headers.is_empty());
    assert_eq!(cfg.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
    assert_eq!(cfg.ping_interval, None);
    assert_eq!(cfg.ping_timeout, Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS));
}

#[test]
fn scheme_follows_secure_flag() {
    let secure = ClientConfig::new("stack.test:8443");
    assert_eq!(secure.http_base_url(), "https://stack.test:8443");
    assert_eq!(secure.ws_url(), "wss://stack.test:8443/ws");

    let plain = secure.with_secure(false);
    assert_eq!(plain.http_base_url(), "http://stack.test:8443");
    assert_eq!(plain.ws_url(), "ws://stack.test:8443/ws");
}

#[test]
fn builder_setters_apply() {
    let cfg = ClientConfig::new("h")
        .with_header("X-Tenant", "acme")
        .with_request_timeout(Duration::from_secs(5))
        .with_ping_interval(Some(Duration::from_secs(15)))
        .with_ping_timeout(Duration::from_secs(3));
    assert_eq!(cfg.headers.get("X-Tenant").map(String::as_str), Some("acme"));
    assert_eq!(cfg.request_timeout, Duration::from_secs(5));
    assert_eq!(cfg.ping_interval, Some(Duration::from_secs(15)));
    assert_eq!(cfg.ping_timeout, Duration::from_secs(3));
}

#[test]
fn from_env_requires_hostname() {
    let _env = env_guard();
    unsafe { clear_stack_env() };

    let err = ClientConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::Missing("STACK_HOSTNAME")));
}

#[test]
fn from_env_parses_overrides() {
    let _env = env_guard();
    unsafe {
        clear_stack_env();
        std::env::set_var("STACK_HOSTNAME", "localhost:9000");
        std::env::set_var("STACK_SECURE", "false");
        std::env::set_var("STACK_REQUEST_TIMEOUT_SECS", "42");
        std::env::set_var("STACK_PING_INTERVAL_SECS", "10");
        std::env::set_var("STACK_PING_TIMEOUT_SECS", "7");
        std::env::set_var("STACK_HEADERS", "X-Tenant: acme, X-Trace: on");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.hostname, "localhost:9000");
    assert!(!cfg.secure);
    assert_eq!(cfg.request_timeout, Duration::from_secs(42));
    assert_eq!(cfg.ping_interval, Some(Duration::from_secs(10)));
    assert_eq!(cfg.ping_timeout, Duration::from_secs(7));
    assert_eq!(cfg.headers.len(), 2);
    assert_eq!(cfg.headers.get("X-Trace").map(String::as_str), Some("on"));

    unsafe { clear_stack_env() };
}

#[test]
fn from_env_zero_ping_interval_disables_pings() {
    let _env = env_guard();
    unsafe {
        clear_stack_env();
        std::env::set_var("STACK_HOSTNAME", "h");
        std::env::set_var("STACK_PING_INTERVAL_SECS", "0");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.ping_interval, None);

    unsafe { clear_stack_env() };
}

#[test]
fn from_env_rejects_bad_values() {
    let _env = env_guard();
    unsafe {
        clear_stack_env();
        std::env::set_var("STACK_HOSTNAME", "h");
        std::env::set_var("STACK_SECURE", "maybe");
    }
    let err = ClientConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("STACK_SECURE"));

    unsafe {
        std::env::set_var("STACK_SECURE", "true");
        std::env::set_var("STACK_HEADERS", "no-colon-here");
    }
    let err = ClientConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("STACK_HEADERS"));

    unsafe { clear_stack_env() };
}

#[test]
fn explicit_hostname_keeps_other_env_settings() {
    let _env = env_guard();
    unsafe {
        clear_stack_env();
        std::env::set_var("STACK_HOSTNAME", "from-env");
        std::env::set_var("STACK_REQUEST_TIMEOUT_SECS", "9");
        std::env::set_var("STACK_HEADERS", "X-Tenant: acme");
    }

    let cfg = ClientConfig::from_env_with_hostname(Some("from-flag:8080".into())).unwrap();
    assert_eq!(cfg.hostname, "from-flag:8080");
    assert_eq!(cfg.request_timeout, Duration::from_secs(9));
    assert_eq!(cfg.headers.get("X-Tenant").map(String::as_str), Some("acme"));

    unsafe { std::env::remove_var("STACK_HOSTNAME") };
    let cfg = ClientConfig::from_env_with_hostname(Some("only-flag".into())).unwrap();
    assert_eq!(cfg.hostname, "only-flag");

    unsafe { clear_stack_env() };
}
