//! Base-URL plumbing shared by every HTTP call site.
//!
//! Provider base URLs arrive from two places with different hygiene: fixed
//! per-provider constants, and the user-supplied Ollama URL, which may carry
//! trailing slashes. Both funnel through here so endpoint construction never
//! produces `//` in a request path.

/// Strip trailing slashes from a base URL.
///
/// # Examples
///
/// ```
/// use palaver::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:11434/"), "http://localhost:11434");
/// assert_eq!(normalize_base_url("http://localhost:11434"), "http://localhost:11434");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
///
/// # Examples
///
/// ```
/// use palaver::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.openai.com/v1/", "/models"),
///     "https://api.openai.com/v1/models"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        normalize_base_url(base_url),
        endpoint.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_any_number_of_trailing_slashes() {
        assert_eq!(normalize_base_url("http://10.0.0.5:11434"), "http://10.0.0.5:11434");
        assert_eq!(normalize_base_url("http://10.0.0.5:11434/"), "http://10.0.0.5:11434");
        assert_eq!(normalize_base_url("http://10.0.0.5:11434///"), "http://10.0.0.5:11434");
        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn construct_joins_with_a_single_slash() {
        assert_eq!(
            construct_api_url("https://api.moonshot.cn/v1", "models"),
            "https://api.moonshot.cn/v1/models"
        );
        assert_eq!(
            construct_api_url("http://localhost:11434/", "api/tags"),
            "http://localhost:11434/api/tags"
        );
        assert_eq!(
            construct_api_url("https://api.deepseek.com", "/chat/completions"),
            "https://api.deepseek.com/chat/completions"
        );
    }
}
