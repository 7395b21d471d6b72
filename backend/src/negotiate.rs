use actix_web::HttpRequest;
use actix_web::http::header::ACCEPT;

/// True when the request's `Accept` header lists `mime` explicitly.
///
/// Wildcards are ignored so browsers (`*/*`) keep getting HTML.
pub fn accepts(req: &HttpRequest, mime: &str) -> bool {
    req.headers()
        .get_all(ACCEPT)
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|item| item.split(';').next())
        .any(|item| item.trim().eq_ignore_ascii_case(mime))
}
