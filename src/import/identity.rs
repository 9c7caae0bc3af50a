use super::parse::fold_diacritics;

const SLUG_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRole {
    Student,
    Staff,
}

impl IdentityRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Staff => "staff",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthesis {
    /// Email was present in the source.
    None,
    /// Derived from the person's name.
    FromName,
    /// Neither email nor a usable name: derived from the row alone.
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub email: String,
    pub name: Option<String>,
    pub role: IdentityRole,
    pub synthesis: Synthesis,
}

impl ResolvedIdentity {
    pub fn is_synthetic(&self) -> bool {
        self.synthesis != Synthesis::None
    }
}

/// Lowercase ASCII slug: diacritics stripped, non-alphanumeric runs collapsed
/// to `_`, trimmed of edge underscores, cut to 30 characters.
pub fn slugify(name: &str) -> String {
    let folded = fold_diacritics(name).to_lowercase();
    let mut out = String::with_capacity(folded.len());
    let mut pending_sep = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    let cut: String = out.chars().take(SLUG_MAX_CHARS).collect();
    cut.trim_end_matches('_').to_string()
}

/// Shared identity resolution for students and staff.
///
/// Students get the row number appended to name-derived placeholders so two
/// homonyms in one file stay distinct; staff placeholders are name-only so the
/// same staff member named on many rows maps to one identity.
pub fn resolve_identity(
    role: IdentityRole,
    email: Option<&str>,
    name: Option<&str>,
    row_number: usize,
    placeholder_domain: &str,
) -> ResolvedIdentity {
    let name = name.map(str::trim).filter(|n| !n.is_empty());
    if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
        return ResolvedIdentity {
            email: email.to_lowercase(),
            name: name.map(str::to_string),
            role,
            synthesis: Synthesis::None,
        };
    }

    let slug = name.map(slugify).unwrap_or_default();
    if !slug.is_empty() {
        let local = match role {
            IdentityRole::Student => format!("{}_{}", slug, row_number),
            IdentityRole::Staff => slug,
        };
        return ResolvedIdentity {
            email: format!("{}@{}", local, placeholder_domain),
            name: name.map(str::to_string),
            role,
            synthesis: Synthesis::FromName,
        };
    }

    ResolvedIdentity {
        email: format!("{}_row_{}@{}", role.as_str(), row_number, placeholder_domain),
        name: name.map(str::to_string),
        role,
        synthesis: Synthesis::Generic,
    }
}

/// True when `email` is outside the institutional domain (subdomains count as inside).
pub fn domain_mismatch(email: &str, institutional_domain: &str) -> bool {
    let want = institutional_domain.trim().trim_start_matches('@').to_lowercase();
    if want.is_empty() {
        return false;
    }
    let Some((_, domain)) = email.rsplit_once('@') else {
        return true;
    };
    let domain = domain.to_lowercase();
    !(domain == want || domain.ends_with(&format!(".{}", want)))
}
