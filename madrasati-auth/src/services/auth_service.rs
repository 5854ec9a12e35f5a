use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use madrasati_shared::errors::{AppError, FieldErrors};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MIN_NAME_LEN: usize = 3;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::internal(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Removes every whitespace character, so "091 234 5678" becomes "0912345678".
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Libyan mobile numbers: `09` + 8 digits, or `+2189` + 8 digits.
pub fn is_libyan_phone(phone: &str) -> bool {
    let rest = if let Some(rest) = phone.strip_prefix("+2189") {
        rest
    } else if let Some(rest) = phone.strip_prefix("09") {
        rest
    } else {
        return false;
    };
    rest.len() == 8 && rest.bytes().all(|b| b.is_ascii_digit())
}

pub fn check_name(name: &str, errors: &mut FieldErrors) {
    if name.trim().chars().count() < MIN_NAME_LEN {
        errors.add("name", format!("name must be at least {MIN_NAME_LEN} characters"));
    }
}

pub fn check_password(password: &str, confirmation: Option<&str>, errors: &mut FieldErrors) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add("password", format!("password must be at least {MIN_PASSWORD_LEN} characters"));
    }
    if let Some(confirmation) = confirmation {
        if confirmation != password {
            errors.add("password_confirmation", "password confirmation does not match");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_libyan_formats() {
        assert!(is_libyan_phone("0912345678"));
        assert!(is_libyan_phone("+218912345678"));
        assert!(is_libyan_phone(&normalize_phone(" 091 234 5678 ")));
    }

    #[test]
    fn rejects_malformed_phones() {
        assert!(!is_libyan_phone("091234567"));
        assert!(!is_libyan_phone("09123456789"));
        assert!(!is_libyan_phone("0812345678"));
        assert!(!is_libyan_phone("+218812345678"));
        assert!(!is_libyan_phone("09a2345678"));
        assert!(!is_libyan_phone(""));
    }

    #[test]
    fn name_is_trimmed_before_length_check() {
        let mut errors = FieldErrors::new();
        check_name("  ab  ", &mut errors);
        assert!(errors.contains("name"));

        let mut errors = FieldErrors::new();
        check_name("علي", &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn password_rules() {
        let mut errors = FieldErrors::new();
        check_password("short", Some("short"), &mut errors);
        assert!(errors.contains("password"));
        assert!(!errors.contains("password_confirmation"));

        let mut errors = FieldErrors::new();
        check_password("longenough", Some("different"), &mut errors);
        assert!(!errors.contains("password"));
        assert!(errors.contains("password_confirmation"));
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn email_is_lowercased() {
        assert_eq!(normalize_email("  Parent@Example.LY "), "parent@example.ly");
    }
}
