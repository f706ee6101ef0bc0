//! Turns a noisy remote acceptance into a display label, a repository URL and
//! the login used to match local users.

use serde::Serialize;

use crate::classroom::{Acceptance, AssignmentDescriptor, first_present};

pub const UNKNOWN_LOGIN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentity {
    /// Human-facing label; never empty.
    pub display_login: String,
    /// Student repository URL, or empty when none is known.
    pub repository_url: String,
    /// Identity matched case-insensitively against `users.github_username`.
    /// Empty when the acceptance carries no usable signal.
    pub canonical_login: String,
}

/// Lowercase, each run of non-alphanumerics becomes one `-`, no leading or trailing `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Slug of a remote assignment: its own slug when set, else derived from the title.
pub fn assignment_slug(assignment: &AssignmentDescriptor) -> String {
    match first_present([assignment.slug.as_deref()]) {
        Some(slug) => slug.to_lowercase(),
        None => slugify(assignment.title.as_deref().unwrap_or_default()),
    }
}

/// Canonical login for matching and the login shown to people, from one acceptance.
pub fn resolve_identity(
    assignment: &AssignmentDescriptor,
    acceptance: &Acceptance,
) -> ResolvedIdentity {
    let student = acceptance.primary_student();
    let primary_login = first_present([
        student.and_then(|s| s.login.as_deref()),
        student.and_then(|s| s.username.as_deref()),
        student.and_then(|s| s.github_username.as_deref()),
        acceptance.login.as_deref(),
        acceptance.username.as_deref(),
        acceptance.github_username.as_deref(),
        acceptance.student_login.as_deref(),
        student.and_then(|s| s.name.as_deref()),
        acceptance.name.as_deref(),
    ])
    .unwrap_or_default();

    let repository = acceptance.repository.as_ref();
    let full_name = repository.and_then(|r| first_present([r.full_name.as_deref()]));
    let repository_url = match repository
        .and_then(|r| first_present([r.html_url.as_deref(), r.url.as_deref()]))
    {
        Some(url) => url.to_string(),
        None => full_name
            .map(|name| format!("https://github.com/{}", name))
            .unwrap_or_default(),
    };
    let repo_name = repository
        .and_then(|r| first_present([r.name.as_deref()]))
        .unwrap_or_default();

    let path = repo_path(&repository_url);
    let (owner_candidate, repo_slug) = split_repo_path(&path);
    let slug = assignment_slug(assignment);

    let uninformative = primary_login.is_empty()
        || primary_login.eq_ignore_ascii_case(&slug)
        || primary_login.eq_ignore_ascii_case(owner_candidate);

    let mut display_login = if uninformative {
        let fallback = first_present([Some(repo_slug), Some(repo_name), Some(owner_candidate)])
            .unwrap_or_default();
        strip_assignment_prefix(fallback, &slug).to_string()
    } else {
        primary_login.to_string()
    };

    if display_login.is_empty() || display_login.eq_ignore_ascii_case(&slug) {
        display_login = owner_candidate.to_string();
    }
    if display_login.is_empty() {
        display_login = UNKNOWN_LOGIN.to_string();
    }

    let canonical_login = first_present([
        Some(primary_login),
        Some(owner_candidate),
        Some(repo_slug),
        Some(repo_name),
    ])
    .unwrap_or_default()
    .to_string();

    ResolvedIdentity {
        display_login,
        repository_url,
        canonical_login,
    }
}

/// `https://github.com/org/repo.git/` and `org/repo` both become `org/repo`.
fn repo_path(url: &str) -> String {
    let without_scheme = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or_default(),
        None => url,
    };
    let path = without_scheme.trim_matches('/');
    let path = path.strip_prefix("repos/").unwrap_or(path);
    path.strip_suffix(".git").unwrap_or(path).to_string()
}

fn split_repo_path(path: &str) -> (&str, &str) {
    match path.split_once('/') {
        Some((owner, rest)) => (owner.trim(), rest.split('/').next().unwrap_or_default().trim()),
        None => ("", path.trim()),
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Drops a leading `{slug}-`/`{slug}_` (or bare slug), else anything up to the
/// first `-`/`_`. Returns the candidate unchanged when nothing is left after stripping.
fn strip_assignment_prefix<'a>(candidate: &'a str, slug: &str) -> &'a str {
    if !slug.is_empty() {
        for separator in ['-', '_'] {
            let prefix = format!("{}{}", slug, separator);
            if let Some(rest) = strip_prefix_ignore_case(candidate, &prefix) {
                if !rest.is_empty() {
                    return rest;
                }
            }
        }
        if let Some(rest) = strip_prefix_ignore_case(candidate, slug) {
            let rest = rest.trim_start_matches(['-', '_']);
            if !rest.is_empty() {
                return rest;
            }
        }
    }

    match candidate.split_once(['-', '_']) {
        Some((_, rest)) if !rest.is_empty() => rest,
        _ => candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(title: &str, slug: Option<&str>) -> AssignmentDescriptor {
        AssignmentDescriptor {
            title: Some(title.to_string()),
            slug: slug.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("CS101: HW 1"), "cs101-hw-1");
        assert_eq!(slugify("  --Lab__02--  "), "lab-02");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_informative_login_is_kept() {
        let acceptance = Acceptance::from_raw(json!({
            "student": { "login": "cs101-alice" },
            "repository": { "full_name": "org/cs101-hw1-alice" }
        }));
        let identity = resolve_identity(&descriptor("CS101 HW1", Some("cs101-hw1")), &acceptance);

        assert_eq!(identity.display_login, "cs101-alice");
        assert_eq!(identity.canonical_login, "cs101-alice");
        assert_eq!(identity.repository_url, "https://github.com/org/cs101-hw1-alice");
    }

    #[test]
    fn test_slug_login_falls_back_to_repository() {
        let acceptance = Acceptance::from_raw(json!({
            "student": { "login": "cs101-hw1" },
            "repository": { "full_name": "org/cs101-hw1-alice" }
        }));
        let identity = resolve_identity(&descriptor("CS101 HW1", Some("cs101-hw1")), &acceptance);

        assert_eq!(identity.display_login, "alice");
        // Matching keeps the raw signal.
        assert_eq!(identity.canonical_login, "cs101-hw1");
    }

    #[test]
    fn test_owner_login_is_uninformative() {
        let acceptance = Acceptance::from_raw(json!({
            "login": "org",
            "repository": { "html_url": "https://github.com/org/lab-2_bob.git" }
        }));
        let identity = resolve_identity(&descriptor("Lab 2", None), &acceptance);

        assert_eq!(identity.display_login, "bob");
        assert_eq!(identity.canonical_login, "org");
    }

    #[test]
    fn test_repository_without_separator_is_kept_whole() {
        let acceptance = Acceptance::from_raw(json!({
            "repository": { "full_name": "org/carol" }
        }));
        let identity = resolve_identity(&descriptor("Project", None), &acceptance);

        assert_eq!(identity.display_login, "carol");
        assert_eq!(identity.canonical_login, "org");
    }

    #[test]
    fn test_students_array_and_name_fallback() {
        let acceptance = Acceptance::from_raw(json!({
            "students": [{ "name": "Dana Scully" }]
        }));
        let identity = resolve_identity(&descriptor("Essay", None), &acceptance);

        assert_eq!(identity.display_login, "Dana Scully");
        assert_eq!(identity.canonical_login, "Dana Scully");
        assert_eq!(identity.repository_url, "");
    }

    #[test]
    fn test_empty_acceptance_is_unknown() {
        let identity = resolve_identity(&descriptor("HW", None), &Acceptance::from_raw(json!({})));
        assert_eq!(
            identity,
            ResolvedIdentity {
                display_login: UNKNOWN_LOGIN.to_string(),
                repository_url: String::new(),
                canonical_login: String::new(),
            }
        );
    }

    #[test]
    fn test_repository_name_only_still_yields_canonical() {
        let acceptance = Acceptance::from_raw(json!({ "repository": { "name": "hw-erin" } }));
        let identity = resolve_identity(&descriptor("HW", None), &acceptance);

        assert_eq!(identity.canonical_login, "hw-erin");
        assert_eq!(identity.display_login, "erin");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let acceptance = Acceptance::from_raw(json!({
            "student": { "login": "  " , "username": "frank" },
            "repository": { "url": "https://api.github.com/repos/org/hw-frank" }
        }));
        let assignment = descriptor("HW", None);
        let first = resolve_identity(&assignment, &acceptance);
        let second = resolve_identity(&assignment, &acceptance);

        assert_eq!(first, second);
        assert_eq!(first.display_login, "frank");
    }
}
