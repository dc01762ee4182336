pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn emails_match(expected: &str, supplied: &str) -> bool {
    normalize_email(expected) == normalize_email(supplied)
}

/// `jane.doe@example.com` -> `j******e@example.com`
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return "*".repeat(email.chars().count());
    };
    let chars: Vec<char> = local.chars().collect();
    let masked_local = match chars.len() {
        0 => String::new(),
        1 | 2 => "*".repeat(chars.len()),
        n => format!("{}{}{}", chars[0], "*".repeat(n - 2), chars[n - 1]),
    };
    format!("{}@{}", masked_local, domain)
}

/// Display name for a placeholder account: the email's local part.
pub fn name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
