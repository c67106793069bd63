//! Input validation
//!
//! Checks run before anything reaches the network: phone numbers, OTP
//! codes, INN control digits, e-mail addresses and upload candidates.

use thiserror::Error;

/// Allowed backup extensions for upload
pub const ALLOWED_EXTENSIONS: [&str; 2] = [".dt", ".bak"];

const INN10_WEIGHTS: [u32; 9] = [2, 4, 10, 3, 5, 9, 4, 6, 8];
const INN12_WEIGHTS_11: [u32; 10] = [7, 2, 4, 10, 3, 5, 9, 4, 6, 8];
const INN12_WEIGHTS_12: [u32; 11] = [3, 7, 2, 4, 10, 3, 5, 9, 4, 6, 8];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid phone number: {0}")]
    Phone(String),

    #[error("Invalid confirmation code")]
    OtpCode,

    #[error("Invalid INN: {0}")]
    Inn(String),

    #[error("Invalid e-mail address: {0}")]
    Email(String),

    #[error("Unsupported file type: {0} (allowed: .dt, .bak)")]
    FileExtension(String),

    #[error("Invalid file size: {size} bytes (max: {max})")]
    FileSize { size: u64, max: u64 },
}

fn digits_of(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Russian phone number: 11 digits starting with 7 or 8, any punctuation
pub fn validate_phone(phone: &str) -> bool {
    let digits = digits_of(phone);
    digits.len() == 11 && (digits.starts_with('7') || digits.starts_with('8'))
}

/// Normalize a phone number to `+7XXXXXXXXXX`.
///
/// Returns the input unchanged when it cannot be normalized.
pub fn normalize_phone(phone: &str) -> String {
    let digits = digits_of(phone);
    match digits.len() {
        11 if digits.starts_with('8') => format!("+7{}", &digits[1..]),
        11 if digits.starts_with('7') => format!("+{}", digits),
        10 => format!("+7{}", digits),
        _ => phone.to_string(),
    }
}

/// Validate and normalize in one step
pub fn checked_phone(phone: &str) -> Result<String, ValidationError> {
    if validate_phone(phone) {
        Ok(normalize_phone(phone))
    } else {
        Err(ValidationError::Phone(phone.to_string()))
    }
}

/// Exactly 10 or 12 ASCII digits; control digits are not checked
pub fn is_inn_format(inn: &str) -> bool {
    (inn.len() == 10 || inn.len() == 12) && inn.bytes().all(|b| b.is_ascii_digit())
}

fn control_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = weights.iter().zip(digits).map(|(w, d)| w * d).sum();
    (sum % 11) % 10
}

/// Validate an INN including its control digit(s).
///
/// 10 digits (organizations) carry one control digit, 12 digits
/// (individuals) carry two.
pub fn validate_inn(inn: &str) -> bool {
    if !is_inn_format(inn) {
        return false;
    }

    let digits: Vec<u32> = inn.bytes().map(|b| u32::from(b - b'0')).collect();

    match digits.len() {
        10 => control_digit(&digits, &INN10_WEIGHTS) == digits[9],
        12 => {
            control_digit(&digits, &INN12_WEIGHTS_11) == digits[10]
                && control_digit(&digits, &INN12_WEIGHTS_12) == digits[11]
        }
        _ => false,
    }
}

pub fn checked_inn(inn: &str) -> Result<String, ValidationError> {
    let trimmed = inn.trim();
    if validate_inn(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(ValidationError::Inn(inn.to_string()))
    }
}

/// 6-digit SMS code
pub fn validate_otp_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Loose `local@domain.tld` check without whitespace
pub fn validate_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub fn validate_file_extension(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

pub fn validate_file_size(size: u64, max: u64) -> bool {
    size > 0 && size <= max
}

/// Pre-upload checks done by the caller before the coordinator starts
pub fn check_upload_candidate(file_name: &str, size: u64, max: u64) -> Result<(), ValidationError> {
    if !validate_file_extension(file_name) {
        return Err(ValidationError::FileExtension(file_name.to_string()));
    }
    if !validate_file_size(size, max) {
        return Err(ValidationError::FileSize { size, max });
    }
    Ok(())
}
