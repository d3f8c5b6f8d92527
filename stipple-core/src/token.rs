//! Hugging Face hub token discovery.

/// Environment variables checked for a hub token, in priority order.
pub const HUB_TOKEN_VARS: [&str; 2] = ["HF_TOKEN", "HUGGINGFACE_TOKEN"];

/// Returns the first non-blank value among [`HUB_TOKEN_VARS`] as seen through `lookup`.
pub fn hub_token_from<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    HUB_TOKEN_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Reads the hub token from the process environment.
pub fn hub_token() -> Option<String> {
    hub_token_from(|name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn primary_name_wins() {
        let token = hub_token_from(lookup_in(&[("HF_TOKEN", "hf_a"), ("HUGGINGFACE_TOKEN", "hf_b")]));
        assert_eq!(token.as_deref(), Some("hf_a"));
    }

    #[test]
    fn falls_back_to_secondary_name() {
        let token = hub_token_from(lookup_in(&[("HUGGINGFACE_TOKEN", "hf_b")]));
        assert_eq!(token.as_deref(), Some("hf_b"));
    }

    #[test]
    fn blank_primary_is_skipped() {
        let token = hub_token_from(lookup_in(&[("HF_TOKEN", "  "), ("HUGGINGFACE_TOKEN", "hf_b")]));
        assert_eq!(token.as_deref(), Some("hf_b"));
    }

    #[test]
    fn none_when_unset() {
        assert_eq!(hub_token_from(lookup_in(&[])), None);
    }
}
