/// Cloud-provider prefixes seen on inference-profile and namespaced ids.
/// Longest first so "us.anthropic." wins over "anthropic.".
const PROVIDER_PREFIXES: &[&str] = &[
    "global.anthropic.",
    "apac.anthropic.",
    "us.anthropic.",
    "eu.anthropic.",
    "au.anthropic.",
    "jp.anthropic.",
    "anthropic.",
    "anthropic/",
];

/// Lookup keys to try for a model id, most specific first.
///
/// "us.anthropic.claude-sonnet-4-5-20250929-v1:0" yields
///   - us.anthropic.claude-sonnet-4-5-20250929-v1:0
///   - claude-sonnet-4-5-20250929-v1:0
///   - claude-sonnet-4-5-20250929
///   - bedrock/us.anthropic.claude-sonnet-4-5-20250929-v1:0
pub fn model_variants(model: &str) -> Vec<String> {
    let mut variants = vec![model.to_string()];

    let stripped = strip_provider_prefix(model);
    push_unique(&mut variants, stripped);
    push_unique(&mut variants, strip_version_suffix(stripped));

    if stripped != model && !model.starts_with("bedrock/") {
        push_unique(&mut variants, &format!("bedrock/{model}"));
    }

    variants
}

fn push_unique(variants: &mut Vec<String>, candidate: &str) {
    if !candidate.is_empty() && !variants.iter().any(|v| v == candidate) {
        variants.push(candidate.to_string());
    }
}

/// Strip "bedrock/", "bedrock/<region>/" and region/provider prefixes.
pub fn strip_provider_prefix(model: &str) -> &str {
    let mut key = model;

    if let Some(rest) = key.strip_prefix("bedrock/") {
        key = match rest.split_once('/') {
            // bedrock/us-west-2/anthropic.claude-...
            Some((region, tail)) if !region.contains('.') => tail,
            _ => rest,
        };
    }

    for prefix in PROVIDER_PREFIXES {
        if let Some(rest) = key.strip_prefix(prefix) {
            return rest;
        }
    }

    key
}

/// Strip a trailing "-vN" or "-vN:M" version tag.
pub fn strip_version_suffix(model: &str) -> &str {
    let Some(idx) = model.rfind("-v") else {
        return model;
    };
    let tag = &model[idx + 2..];
    let (major, minor) = match tag.split_once(':') {
        Some((major, minor)) => (major, Some(minor)),
        None => (tag, None),
    };
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if digits(major) && minor.map_or(true, digits) {
        &model[..idx]
    } else {
        model
    }
}

/// Strip a trailing "-YYYYMMDD" release date.
pub fn strip_date_suffix(model: &str) -> &str {
    let len = model.len();
    if len > 9
        && model.as_bytes()[len - 9] == b'-'
        && model.as_bytes()[len - 8..].iter().all(u8::is_ascii_digit)
    {
        &model[..len - 9]
    } else {
        model
    }
}
