pub mod backend;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_AUDIT_CAPACITY: &str = "audit-capacity";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("noticeboard")
        .about("Department notice board access control")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("NOTICEBOARD_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_AUDIT_CAPACITY)
                .long(ARG_AUDIT_CAPACITY)
                .help("Number of access attempts kept in memory")
                .default_value("256")
                .env("NOTICEBOARD_AUDIT_CAPACITY")
                .value_parser(clap::value_parser!(usize)),
        );

    let command = backend::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::{ARG_REFRESH_TOKEN, ARG_REQUEST_TIMEOUT_SECONDS, ARG_SUPABASE_ANON_KEY, ARG_SUPABASE_URL};

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "noticeboard");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Department notice board access control".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_args() {
        temp_env::with_vars([("NOTICEBOARD_REFRESH_TOKEN", None::<String>)], || {
            let command = new();
            let matches = command.get_matches_from(vec![
                "noticeboard",
                "--port",
                "9090",
                "--supabase-url",
                "https://project.supabase.co",
                "--supabase-anon-key",
                "anon-key",
            ]);

            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9090));
            assert_eq!(
                matches.get_one::<String>(ARG_SUPABASE_URL).cloned(),
                Some("https://project.supabase.co".to_string())
            );
            assert_eq!(
                matches.get_one::<String>(ARG_SUPABASE_ANON_KEY).cloned(),
                Some("anon-key".to_string())
            );
            assert_eq!(matches.get_one::<String>(ARG_REFRESH_TOKEN), None);
            assert_eq!(
                matches.get_one::<u64>(ARG_REQUEST_TIMEOUT_SECONDS).copied(),
                Some(10)
            );
            assert_eq!(matches.get_one::<usize>(ARG_AUDIT_CAPACITY).copied(), Some(256));
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("NOTICEBOARD_SUPABASE_URL", Some("https://project.supabase.co")),
                ("NOTICEBOARD_SUPABASE_ANON_KEY", Some("anon-key")),
                ("NOTICEBOARD_REFRESH_TOKEN", Some("refresh-token")),
                ("NOTICEBOARD_REQUEST_TIMEOUT_SECONDS", Some("30")),
                ("NOTICEBOARD_AUDIT_CAPACITY", Some("16")),
                ("NOTICEBOARD_PORT", Some("443")),
                ("NOTICEBOARD_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["noticeboard"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>(ARG_REFRESH_TOKEN).cloned(),
                    Some("refresh-token".to_string())
                );
                assert_eq!(
                    matches.get_one::<u64>(ARG_REQUEST_TIMEOUT_SECONDS).copied(),
                    Some(30)
                );
                assert_eq!(matches.get_one::<usize>(ARG_AUDIT_CAPACITY).copied(), Some(16));
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_missing_supabase_url() {
        temp_env::with_vars(
            [
                ("NOTICEBOARD_SUPABASE_URL", None::<&str>),
                ("NOTICEBOARD_SUPABASE_ANON_KEY", Some("anon-key")),
            ],
            || {
                let result = new().try_get_matches_from(vec!["noticeboard"]);
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let result = new().try_get_matches_from(vec![
            "noticeboard",
            "--supabase-url",
            "https://project.supabase.co",
            "--supabase-anon-key",
            "anon-key",
            "--request-timeout-seconds",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("NOTICEBOARD_LOG_LEVEL", Some(level)),
                    ("NOTICEBOARD_SUPABASE_URL", Some("https://project.supabase.co")),
                    ("NOTICEBOARD_SUPABASE_ANON_KEY", Some("anon-key")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["noticeboard"]);
                    assert_eq!(
                        matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                        u8::try_from(index).ok()
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("NOTICEBOARD_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "noticeboard".to_string(),
                    "--supabase-url".to_string(),
                    "https://project.supabase.co".to_string(),
                    "--supabase-anon-key".to_string(),
                    "anon-key".to_string(),
                ];

                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }
}
