// src/models/mod.rs

pub mod activity;
pub mod board;
pub mod ingredient;
pub mod nutrition;
pub mod rating;
pub mod recipe;
pub mod report;
pub mod units;
pub mod user;

/// Clamps a requested page size: default 20, at most 100.
pub fn page_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(20).clamp(1, 100)
}

#[cfg(test)]
mod tests {
    use super::page_limit;

    #[test]
    fn page_limit_defaults_and_clamps() {
        assert_eq!(page_limit(None), 20);
        assert_eq!(page_limit(Some(500)), 100);
        assert_eq!(page_limit(Some(0)), 1);
        assert_eq!(page_limit(Some(7)), 7);
    }
}
