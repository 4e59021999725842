// Session id transport
// Reads the id from cookie, query string or header and writes it back

use crate::config::ManagerConfig;
use crate::error::{SessionError, SessionResult};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use cookie::Cookie;
use cookie::time::{Duration, OffsetDateTime};

fn query_unescape(raw: &str) -> SessionResult<String> {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|s| s.into_owned())
        .map_err(|e| SessionError::Transport(format!("malformed escape in '{}': {}", raw, e)))
}

fn query_escape(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Value of the first cookie named `name`, unescaped. Empty values count as absent.
fn cookie_value(headers: &HeaderMap, name: &str) -> SessionResult<Option<String>> {
    for header in headers.get_all(COOKIE) {
        let raw = header
            .to_str()
            .map_err(|e| SessionError::Transport(format!("invalid Cookie header: {}", e)))?;

        for cookie in Cookie::split_parse(raw).filter_map(Result::ok) {
            if cookie.name() != name {
                continue;
            }

            let value = cookie.value_trimmed();
            if value.is_empty() {
                return Ok(None);
            }
            return query_unescape(value).map(Some);
        }
    }

    Ok(None)
}

fn query_value(parts: &Parts, name: &str) -> SessionResult<Option<String>> {
    let Some(query) = parts.uri.query() else {
        return Ok(None);
    };

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if query_unescape(key)? == name {
            let value = query_unescape(value)?;
            return Ok(if value.is_empty() { None } else { Some(value) });
        }
    }

    Ok(None)
}

fn header_value(headers: &HeaderMap, name: &str) -> SessionResult<Option<String>> {
    match headers.get(name) {
        Some(value) => {
            let value = value.to_str().map_err(|e| {
                SessionError::Transport(format!("invalid {} header: {}", name, e))
            })?;
            Ok(Some(value.to_string()).filter(|v| !v.is_empty()))
        }
        None => Ok(None),
    }
}

/// Resolve the inbound session id.
/// Priority: cookie, then URL query (if enabled), then header (if enabled).
pub fn extract_session_id(config: &ManagerConfig, parts: &Parts) -> SessionResult<Option<String>> {
    if let Some(id) = cookie_value(&parts.headers, &config.cookie_name)? {
        return Ok(Some(id));
    }

    if config.enable_id_in_url_query
        && let Some(id) = query_value(parts, &config.cookie_name)?
    {
        return Ok(Some(id));
    }

    if config.enable_id_in_header {
        return header_value(&parts.headers, &config.header_name);
    }

    Ok(None)
}

/// https is taken from the request scheme, or from X-Forwarded-Proto behind a proxy
pub fn is_secure(config: &ManagerConfig, parts: &Parts) -> bool {
    if !config.secure {
        return false;
    }
    if let Some(scheme) = parts.uri.scheme_str() {
        return scheme == "https";
    }
    parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Set-Cookie value binding `id`
pub fn session_cookie(config: &ManagerConfig, id: &str, secure: bool) -> String {
    let mut cookie = Cookie::build((config.cookie_name.clone(), query_escape(id)))
        .path("/")
        .http_only(!config.disable_http_only)
        .secure(secure);

    if let Some(domain) = config.domain.clone().filter(|d| !d.is_empty()) {
        cookie = cookie.domain(domain);
    }
    if config.cookie_lifetime_secs > 0 {
        let lifetime = Duration::seconds(config.cookie_lifetime_secs as i64);
        cookie = cookie
            .max_age(lifetime)
            .expires(OffsetDateTime::now_utc() + lifetime);
    }

    cookie.build().to_string()
}

/// Set-Cookie value that makes the browser drop the session cookie
pub fn expired_cookie(config: &ManagerConfig) -> String {
    let mut cookie = Cookie::build((config.cookie_name.clone(), ""))
        .path("/")
        .http_only(!config.disable_http_only);

    if let Some(domain) = config.domain.clone().filter(|d| !d.is_empty()) {
        cookie = cookie.domain(domain);
    }

    let mut cookie = cookie.build();
    cookie.make_removal();
    cookie.to_string()
}

fn header_name(config: &ManagerConfig) -> SessionResult<HeaderName> {
    HeaderName::from_bytes(config.header_name.as_bytes())
        .map_err(|e| SessionError::Config(format!("invalid header_name: {}", e)))
}

fn header_value_of(raw: &str) -> SessionResult<HeaderValue> {
    HeaderValue::from_str(raw)
        .map_err(|e| SessionError::Transport(format!("cannot encode header value: {}", e)))
}

/// Replace our cookie in the inbound Cookie headers so later lookups in
/// the same request see the freshly bound id
fn replace_request_cookie(headers: &mut HeaderMap, name: &str, id: &str) -> SessionResult<()> {
    let mut pairs = vec![Cookie::new(name, query_escape(id)).to_string()];
    for header in headers.get_all(COOKIE) {
        if let Ok(raw) = header.to_str() {
            pairs.extend(
                Cookie::split_parse(raw)
                    .filter_map(Result::ok)
                    .filter(|c| c.name() != name)
                    .map(|c| c.to_string()),
            );
        }
    }

    headers.remove(COOKIE);
    headers.insert(COOKIE, header_value_of(&pairs.join("; "))?);
    Ok(())
}

/// Bind `id` to the outbound response (cookie and/or header per config)
/// and to the inbound request for the remainder of its handling.
pub fn bind_session_id(
    config: &ManagerConfig,
    id: &str,
    parts: &mut Parts,
    response: &mut HeaderMap,
) -> SessionResult<()> {
    if config.enable_set_cookie {
        let cookie = session_cookie(config, id, is_secure(config, parts));
        response.append(SET_COOKIE, header_value_of(&cookie)?);
    }
    replace_request_cookie(&mut parts.headers, &config.cookie_name, id)?;

    if config.enable_id_in_header {
        let name = header_name(config)?;
        let value = header_value_of(id)?;
        parts.headers.insert(name.clone(), value.clone());
        response.insert(name, value);
    }

    Ok(())
}

/// Drop the id header from request and response
pub fn clear_header(config: &ManagerConfig, parts: &mut Parts, response: &mut HeaderMap) {
    if !config.enable_id_in_header {
        return;
    }
    if let Ok(name) = header_name(config) {
        parts.headers.remove(&name);
        response.remove(&name);
    }
}

/// Tell the client to forget the session cookie
pub fn expire_cookie(config: &ManagerConfig, response: &mut HeaderMap) -> SessionResult<()> {
    if config.enable_set_cookie {
        response.append(SET_COOKIE, header_value_of(&expired_cookie(config))?);
    }
    Ok(())
}
