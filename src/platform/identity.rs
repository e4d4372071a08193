// NexusLIMS Logger - platform/identity.rs
//
// Who and where: the operator's login name and this computer's short name,
// both recorded with every session.

/// This computer's name up to the first `.` (no domain suffix).
pub fn computer_name() -> String {
    let raw = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Cannot read hostname");
            String::new()
        });
    short_name(&raw)
}

/// Login name of the current user, from the usual environment variables.
pub fn login_name() -> String {
    login_name_from(&|key: &str| std::env::var(key).ok())
}

fn login_name_from(env: &dyn Fn(&str) -> Option<String>) -> String {
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .iter()
        .filter_map(|key| env(key))
        .find(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn short_name(host: &str) -> String {
    host.split('.').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_suffix_is_dropped() {
        assert_eq!(short_name("titan-pc.lab.example.org"), "titan-pc");
        assert_eq!(short_name("titan-pc"), "titan-pc");
        assert_eq!(short_name(""), "");
    }

    #[test]
    fn login_name_follows_variable_precedence() {
        let env = |key: &str| match key {
            "USER" => Some("jdoe".to_string()),
            "USERNAME" => Some("JDOE-WIN".to_string()),
            _ => None,
        };
        assert_eq!(login_name_from(&env), "jdoe");
        assert_eq!(login_name_from(&|_: &str| None), "unknown");
    }
}
