use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    // Downstream service URLs
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_school_url")]
    pub school_url: String,

    // Rate limits
    #[serde(default = "default_parent_rpm")]
    pub parent_rpm: u64,
    #[serde(default = "default_parent_rph")]
    pub parent_rph: u64,
    #[serde(default = "default_staff_rpm")]
    pub staff_rpm: u64,
    #[serde(default = "default_staff_rph")]
    pub staff_rph: u64,

    /// Comma-separated list of origins allowed by CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 { 4000 }
fn default_jwt_secret() -> String { madrasati_shared::middleware::jwt_secret() }
fn default_redis_url() -> String { "redis://localhost:6379".into() }
fn default_auth_url() -> String { "http://localhost:4001".into() }
fn default_school_url() -> String { "http://localhost:4002".into() }
fn default_parent_rpm() -> u64 { 60 }
fn default_parent_rph() -> u64 { 600 }
fn default_staff_rpm() -> u64 { 300 }
fn default_staff_rph() -> u64 { 3000 }
fn default_cors_origins() -> String { "http://localhost:5173,http://127.0.0.1:5173".into() }
fn default_max_body_bytes() -> usize { 6 * 1024 * 1024 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            jwt_secret: default_jwt_secret(),
            redis_url: default_redis_url(),
            auth_url: default_auth_url(),
            school_url: default_school_url(),
            parent_rpm: default_parent_rpm(),
            parent_rph: default_parent_rph(),
            staff_rpm: default_staff_rpm(),
            staff_rph: default_staff_rph(),
            cors_origins: default_cors_origins(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Downstream service a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Auth,
    School,
}

impl Upstream {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::School => "school",
        }
    }
}

/// First path segments served by the auth service.
const AUTH_SEGMENTS: &[&str] = &["register", "login", "logout", "refresh", "user"];

/// Path segments that are never exposed through the gateway.
const PRIVATE_SEGMENTS: &[&str] = &["internal", "health"];

/// Whether a raw path segment is `.` or `..`, also percent-encoded, or
/// carries a backslash the URL parser would treat as a separator.
fn is_unsafe_segment(segment: &str) -> bool {
    let lower = segment.to_ascii_lowercase();
    if lower.contains('\\') || lower.contains("%5c") {
        return true;
    }
    let decoded = lower.replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// The part of `path` after `/api`, when the path lives under `/api`.
/// Paths with dot segments are refused so the segment used for routing is
/// the one the upstream receives.
pub fn strip_prefix(path: &str) -> Option<&str> {
    if path.split('/').any(is_unsafe_segment) {
        return None;
    }
    let rest = path.strip_prefix("/api")?;
    if rest.len() > 1 && rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn first_segment(rest: &str) -> &str {
    rest.trim_start_matches('/').split('/').next().unwrap_or_default()
}

/// Resolves the upstream service from the incoming request path.
pub fn resolve_upstream(path: &str) -> Option<Upstream> {
    let segment = first_segment(strip_prefix(path)?);
    if PRIVATE_SEGMENTS.contains(&segment) {
        None
    } else if AUTH_SEGMENTS.contains(&segment) {
        Some(Upstream::Auth)
    } else {
        Some(Upstream::School)
    }
}

/// Whether a request may pass without a bearer token.
pub fn is_public(method: &axum::http::Method, path: &str) -> bool {
    let Some(rest) = strip_prefix(path) else {
        return false;
    };
    match first_segment(rest) {
        "register" | "login" | "logout" | "refresh" => true,
        "schools" => *method == axum::http::Method::GET,
        _ => false,
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MADRASATI_GATEWAY").separator("__"))
            .build()?;
        Ok(config.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "invalid gateway configuration, using defaults");
            Self::default()
        }))
    }

    pub fn upstream_url(&self, upstream: Upstream) -> &str {
        match upstream {
            Upstream::Auth => &self.auth_url,
            Upstream::School => &self.school_url,
        }
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn auth_paths_go_to_auth() {
        for path in ["/api/register", "/api/login", "/api/logout", "/api/refresh", "/api/user"] {
            assert_eq!(resolve_upstream(path), Some(Upstream::Auth), "{path}");
        }
        assert_eq!(strip_prefix("/api/login"), Some("/login"));
    }

    #[test]
    fn everything_else_goes_to_school() {
        assert_eq!(resolve_upstream("/api/schools"), Some(Upstream::School));
        assert_eq!(resolve_upstream("/api/schools/sunrise-academy/reviews"), Some(Upstream::School));
        assert_eq!(resolve_upstream("/api/admin/reports/3/dismiss"), Some(Upstream::School));
        assert_eq!(resolve_upstream("/api/users"), Some(Upstream::School));
        assert_eq!(strip_prefix("/api/school-admin/profile"), Some("/school-admin/profile"));
    }

    #[test]
    fn internal_and_unknown_prefixes_are_not_routed() {
        assert_eq!(resolve_upstream("/api/internal/users/1"), None);
        assert_eq!(resolve_upstream("/api/health"), None);
        assert_eq!(resolve_upstream("/api"), None);
        assert_eq!(resolve_upstream("/api/"), None);
        assert_eq!(resolve_upstream("/apix/login"), None);
        assert_eq!(resolve_upstream("/login"), None);
    }

    #[test]
    fn dot_segments_are_never_routed() {
        for path in [
            "/api/login/../internal/school-admins",
            "/api/login/%2e%2e/internal/users/1",
            "/api/login/%2E%2E/internal/users/1",
            "/api/login/.%2e/internal/users/1",
            "/api/schools/../admin/stats",
            "/api/schools/./sunrise-academy",
            "/api/login/..%5cinternal/users/1",
            "/api/login/..\\internal/users/1",
        ] {
            assert_eq!(resolve_upstream(path), None, "{path}");
            assert_eq!(strip_prefix(path), None, "{path}");
            assert!(!is_public(&Method::GET, path), "{path}");
            assert!(!is_public(&Method::POST, path), "{path}");
        }
    }

    #[test]
    fn dots_inside_a_segment_are_allowed() {
        assert_eq!(resolve_upstream("/api/schools/st.mary..school"), Some(Upstream::School));
        assert!(is_public(&Method::GET, "/api/schools/st.mary..school"));
    }

    #[test]
    fn only_directory_reads_are_public() {
        assert!(is_public(&Method::POST, "/api/login"));
        assert!(is_public(&Method::POST, "/api/register"));
        assert!(is_public(&Method::GET, "/api/schools"));
        assert!(is_public(&Method::GET, "/api/schools/sunrise-academy"));
        assert!(!is_public(&Method::POST, "/api/schools/sunrise-academy/reviews"));
        assert!(!is_public(&Method::GET, "/api/user"));
        assert!(!is_public(&Method::GET, "/api/my-reviews"));
        assert!(!is_public(&Method::GET, "/api/admin/moderation"));
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let config = AppConfig { cors_origins: " https://madrasati.ly , ,http://localhost:5173".into(), ..Default::default() };
        assert_eq!(config.allowed_origins(), vec!["https://madrasati.ly", "http://localhost:5173"]);
    }
}
