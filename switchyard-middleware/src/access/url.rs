use http::header::HOST;
use switchyard_core::Request;

fn header<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The URL the client actually asked for, as seen through any proxies.
pub fn full_url(req: &Request) -> String {
    let proto = header(req, "x-forwarded-proto")
        .or_else(|| req.uri().scheme_str())
        .unwrap_or("http");

    let host = header(req, "x-forwarded-host")
        .or_else(|| header(req, HOST.as_str()))
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    let port = header(req, "x-forwarded-port").filter(|_| !host.contains(':'));

    let uri = header(req, "x-forwarded-uri")
        .or_else(|| req.uri().path_and_query().map(|p| p.as_str()))
        .unwrap_or("/");

    match port {
        Some(port) => format!("{proto}://{host}:{port}{uri}"),
        None => format!("{proto}://{host}{uri}"),
    }
}
