//! A few static pages so the binary is a working, tracked site.

use axum::{http::StatusCode, response::Html};

const LAYOUT_HEAD: &str = "<!doctype html><html><head><meta charset=\"utf-8\">\
<title>visitlog</title></head><body><nav><a href=\"/\">Home</a> | \
<a href=\"/about\">About</a></nav><main>";
const LAYOUT_TAIL: &str = "</main></body></html>";

fn page(body: &str) -> Html<String> {
    Html(format!("{LAYOUT_HEAD}{body}{LAYOUT_TAIL}"))
}

pub async fn home() -> Html<String> {
    page("<h1>visitlog</h1><p>Every visit to this site is recorded. \
          See <a href=\"/api/analytics/stats\">the stats</a>.</p>")
}

pub async fn about() -> Html<String> {
    page("<h1>About</h1><p>A self-hosted request analytics pipeline backed by DuckDB.</p>")
}

pub async fn not_found() -> (StatusCode, Html<String>) {
    (
        StatusCode::NOT_FOUND,
        page("<h1>Not found</h1><p>Nothing lives at this address.</p>"),
    )
}
