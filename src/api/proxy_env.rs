//! Forward proxy selection from environment-style settings.

/// Local capture proxies used during development. Calls to the open platform
/// must not loop back through them.
pub const LOCAL_CAPTURE_PROXIES: [&str; 2] = ["127.0.0.1:12759", "127.0.0.1:12639"];

/// Pick the forward proxy for `domain` using the process environment.
pub fn forward_proxy_from_env(https: bool, domain: &str) -> Option<String> {
    forward_proxy_for(https, domain, |key| std::env::var(key).ok())
}

/// Pick the forward proxy for `domain` from the variables `lookup` returns.
///
/// `NO_PROXY`/`no_proxy` listing the domain disables the proxy, as does a
/// proxy pointing at one of [`LOCAL_CAPTURE_PROXIES`].
pub fn forward_proxy_for<F>(https: bool, domain: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let bypassed = ["NO_PROXY", "no_proxy"]
        .iter()
        .filter_map(|key| lookup(key))
        .any(|list| list.contains(domain));
    if bypassed {
        return None;
    }

    let keys: [&str; 2] = if https {
        ["HTTPS_PROXY", "https_proxy"]
    } else {
        ["HTTP_PROXY", "http_proxy"]
    };

    let proxy = keys
        .iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())?;

    if LOCAL_CAPTURE_PROXIES
        .iter()
        .any(|local| proxy.contains(local))
    {
        return None;
    }

    Some(proxy)
}
