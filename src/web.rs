use crate::prompts::WEB_UI_TITLE;
use axum::response::{Html, Redirect};

const INDEX_HTML: &str = include_str!("web/index.html");

pub async fn redirect_to_ui() -> Redirect {
    Redirect::temporary("/dev-ui/")
}

pub async fn index() -> Html<String> {
    Html(INDEX_HTML.replace("{title}", WEB_UI_TITLE))
}
