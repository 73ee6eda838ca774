use rand::{Rng, distributions::Alphanumeric};

/// Six-digit numeric code sent by mail during password reset.
pub fn reset_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Opaque single-use token handed out once a reset code has been verified.
pub fn reset_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

/// Current Unix time in seconds; short-lived auth state is stored this way.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_code_is_six_digits() {
        for _ in 0..50 {
            let code = reset_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn reset_tokens_are_long_and_distinct() {
        let a = reset_token();
        let b = reset_token();
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }
}
