//! Reads identity signals off request headers and cookies, and builds the
//! cookie updates handlers send back.

use super::AppState;
use crate::blocklist::BlockStatus;
use crate::identity::{IdentitySignals, VoteKind};
use crate::utils::ONE_YEAR_IN_SECONDS;
use axum::extract::State;
use axum::http::header::{HeaderName, COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";
const FINGERPRINT_HEADER: &str = "x-fingerprint";
const CLIENT_IP_COOKIE: &str = "client_ip";
const FINGERPRINT_COOKIE: &str = "fp";
const UNKNOWN_IP: &str = "0.0.0.0";

pub(crate) fn vote_cookie_name(subject_id: &str) -> String {
    format!("voted_subject_{subject_id}")
}

pub(crate) fn like_cookie_name(comment_id: &str) -> String {
    format!("voted_comment_{comment_id}")
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Value of the named cookie across every `Cookie` header.
pub(crate) fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| unquote(value.trim()))
        .filter(|value| !value.is_empty())
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

/// RFC 6265 token: visible ASCII minus separators.
fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}

fn is_cookie_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_graphic() && !b"\",;\\".contains(&b))
}

/// First `x-forwarded-for` hop, then `x-real-ip`.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    header(headers, FORWARDED_FOR)
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header(headers, REAL_IP))
        .map(str::to_string)
}

/// Proxy headers, then the `client_ip` cookie, then the socket peer.
pub(crate) fn client_ip(headers: &HeaderMap, peer: IpAddr) -> String {
    forwarded_ip(headers)
        .or_else(|| cookie(headers, CLIENT_IP_COOKIE).map(str::to_string))
        .unwrap_or_else(|| peer.to_string())
}

pub(crate) fn fingerprint(headers: &HeaderMap) -> Option<String> {
    header(headers, FINGERPRINT_HEADER)
        .or_else(|| cookie(headers, FINGERPRINT_COOKIE))
        .map(str::to_string)
}

/// Signals for a request, with the vote cookie for `subject_id` when given.
/// Always carries an IP.
pub(crate) fn request_identity(
    headers: &HeaderMap,
    peer: IpAddr,
    subject_id: Option<&str>,
) -> IdentitySignals {
    let cookie_vote = subject_id
        .and_then(|id| cookie(headers, &vote_cookie_name(id)))
        .and_then(|raw| raw.parse::<VoteKind>().ok());
    IdentitySignals::new(Some(client_ip(headers, peer)), fingerprint(headers))
        .with_cookie_vote(cookie_vote)
}

/// `Set-Cookie` header that stores `value` for a year, or expires the cookie
/// when `value` is `None`. `None` when the pair cannot be sent as a cookie
/// unquoted, e.g. a path id containing `;`.
pub(crate) fn set_cookie(name: &str, value: Option<&str>) -> Option<(HeaderName, String)> {
    if !is_cookie_name(name) || !value.map_or(true, is_cookie_value) {
        tracing::debug!(cookie = %name, "skipping cookie that cannot be encoded");
        return None;
    }
    let cookie = match value {
        Some(value) => format!("{name}={value}; Max-Age={ONE_YEAR_IN_SECONDS}; Path=/; SameSite=Lax"),
        None => format!("{name}=; Max-Age=0; Path=/; SameSite=Lax"),
    };
    Some((SET_COOKIE, cookie))
}

#[derive(Debug, Serialize)]
pub(crate) struct ClientIpResponse {
    ip: String,
}

pub(crate) async fn client_ip_handler(headers: HeaderMap) -> Json<ClientIpResponse> {
    Json(ClientIpResponse {
        ip: forwarded_ip(&headers).unwrap_or_else(|| UNKNOWN_IP.to_string()),
    })
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BlockCheckRequest {
    ip: Option<String>,
    fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BlockCheckResponse {
    blocked: bool,
    #[serde(flatten)]
    status: BlockStatus,
}

/// Never fails: lookup errors count as not blocked.
pub(crate) async fn block_check_handler(
    State(state): State<AppState>,
    payload: Option<Json<BlockCheckRequest>>,
) -> Json<BlockCheckResponse> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let identity = IdentitySignals::new(request.ip, request.fingerprint);
    let status = state.service.blocklist().status_fail_open(&identity).await;
    Json(BlockCheckResponse {
        blocked: status.blocked(),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const PEER: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&map, PEER), "203.0.113.9");

        let map = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_ip(&map, PEER), "198.51.100.2");

        let map = headers(&[("cookie", "client_ip=192.0.2.1; fp=abc")]);
        assert_eq!(client_ip(&map, PEER), "192.0.2.1");
    }

    #[test]
    fn bare_request_is_identified_by_its_peer() {
        assert_eq!(client_ip(&HeaderMap::new(), PEER), "127.0.0.1");

        let identity = request_identity(&HeaderMap::new(), PEER, Some("81.57"));
        assert_eq!(identity.ip(), Some("127.0.0.1"));
        assert_eq!(identity.fingerprint(), None);
        assert!(!identity.is_anonymous());

        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        assert_eq!(request_identity(&HeaderMap::new(), v6, None).ip(), Some("::1"));
    }

    #[test]
    fn fingerprint_header_beats_cookie() {
        let map = headers(&[("x-fingerprint", "hdr"), ("cookie", "fp=ck")]);
        assert_eq!(fingerprint(&map).as_deref(), Some("hdr"));
        let map = headers(&[("cookie", "fp=ck")]);
        assert_eq!(fingerprint(&map).as_deref(), Some("ck"));
    }

    #[test]
    fn vote_cookie_is_read_per_subject() {
        let map = headers(&[
            ("cookie", "voted_subject_81.57=dislike"),
            ("cookie", "voted_subject_93.26=garbage"),
        ]);
        let identity = request_identity(&map, PEER, Some("81.57"));
        assert_eq!(identity.cookie_vote, Some(VoteKind::Dislike));
        assert_eq!(request_identity(&map, PEER, Some("93.26")).cookie_vote, None);
        assert_eq!(request_identity(&map, PEER, None).cookie_vote, None);
    }

    #[test]
    fn quoted_cookie_values_are_unwrapped() {
        let map = headers(&[("cookie", "fp=\"abc\"; voted_subject_81.57=\"like\"")]);
        assert_eq!(fingerprint(&map).as_deref(), Some("abc"));
        assert_eq!(
            request_identity(&map, PEER, Some("81.57")).cookie_vote,
            Some(VoteKind::Like)
        );
    }

    #[test]
    fn cookie_updates_set_or_expire() {
        let (name, value) = set_cookie("voted_subject_81.57", Some("like")).unwrap();
        assert_eq!(name, SET_COOKIE);
        assert!(value.starts_with("voted_subject_81.57=like;"));
        assert!(value.contains("Max-Age=31536000"));
        assert!(value.contains("Path=/"));

        let (_, cleared) = set_cookie("voted_subject_81.57", None).unwrap();
        assert!(cleared.contains("Max-Age=0"));
    }

    #[test]
    fn unencodable_cookies_are_not_sent() {
        assert!(set_cookie("voted_subject_81.57; Domain=evil.example", Some("like")).is_none());
        assert!(set_cookie("voted_subject_a b", None).is_none());
        assert!(set_cookie("voted_comment_x=y", Some("true")).is_none());
        assert!(set_cookie("voted_comment_1", Some("a;b")).is_none());
        assert!(set_cookie("", Some("like")).is_none());
        assert!(set_cookie("voted_comment_3f2c-9a", Some("true")).is_some());
    }
}
