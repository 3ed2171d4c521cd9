//! Human-readable status page. Reads the store, never writes it.

use axum::extract::State;
use axum::response::Html;

use crate::routes::AppState;

/// Seconds between page reloads.
const REFRESH_SECS: u32 = 5;

/// `GET /`
pub async fn status_page(State(state): State<AppState>) -> Html<String> {
    let store = state.store().clone();
    let passing = tokio::task::spawn_blocking(move || store.aggregate())
        .await
        .unwrap_or(false);
    Html(render(passing))
}

fn render(passing: bool) -> String {
    let status = if passing { "passing" } else { "failing" };
    format!(
        "<html>\n  <head>\n    <meta http-equiv=\"refresh\" content=\"{REFRESH_SECS}; url=/\">\n  \
         </head>\n  <body>\n    Build is {status}\n  </body>\n</html>\n"
    )
}
