/// Sanitizes user-authored rich text (forum posts, answers, recipe steps).
///
/// Whitelist based: safe formatting tags survive, `<script>` and friends are
/// removed together with their content, event-handler attributes are dropped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Sanitizes every entry of a list, dropping entries that end up empty.
pub fn clean_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| clean_html(item).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
