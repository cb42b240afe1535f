use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Model output is rendered by the dashboards, so safe formatting tags (like
/// <b>, <p>) are kept while <script>, <iframe> and event-handler attributes
/// are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
