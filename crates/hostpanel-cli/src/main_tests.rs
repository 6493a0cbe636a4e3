//! CLI tests

use clap::{CommandFactory, Parser};

use crate::{Cli, Commands, ConfigAction, OutputFormat, PluginAction, ThemeAction};
use hostpanel_plugins::PluginState;

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["hostpanel", "plugins", "stats", "--format", "json", "-q"]).unwrap();
    assert!(cli.format == OutputFormat::Json);
    assert!(cli.quiet);
    assert!(matches!(
        cli.command,
        Commands::Plugins {
            action: PluginAction::Stats
        }
    ));
}

#[test]
fn test_plugin_list_state_filter() {
    let cli = Cli::try_parse_from(["hostpanel", "plugins", "list", "--state", "update-pending"]).unwrap();
    match cli.command {
        Commands::Plugins {
            action: PluginAction::List { state },
        } => assert_eq!(state, Some(PluginState::UpdatePending)),
        _ => panic!("expected plugins list"),
    }

    assert!(Cli::try_parse_from(["hostpanel", "plugins", "list", "--state", "sleeping"]).is_err());
}

#[test]
fn test_plugin_lifecycle_flags() {
    let cli = Cli::try_parse_from(["hostpanel", "plugins", "disable", "tickets", "--cascade"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Plugins {
            action: PluginAction::Disable { ref name, cascade: true }
        } if name == "tickets"
    ));

    let cli = Cli::try_parse_from(["hostpanel", "plugins", "uninstall", "tickets", "--keep-files"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Plugins {
            action: PluginAction::Uninstall { keep_files: true, .. }
        }
    ));

    let cli = Cli::try_parse_from(["hostpanel", "plugins", "install-deps", "tickets", "--clean"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Plugins {
            action: PluginAction::InstallDeps { clean: true, .. }
        }
    ));
}

#[test]
fn test_theme_commands() {
    let cli = Cli::try_parse_from(["hostpanel", "themes", "upload", "aurora.zip", "--ignore-warnings"]).unwrap();
    match cli.command {
        Commands::Themes {
            action: ThemeAction::Upload {
                archive,
                ignore_warnings,
            },
        } => {
            assert_eq!(archive, std::path::PathBuf::from("aurora.zip"));
            assert!(ignore_warnings);
        }
        _ => panic!("expected themes upload"),
    }

    let cli = Cli::try_parse_from(["hostpanel", "themes", "upgrade", "classic", "--no-backup"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Themes {
            action: ThemeAction::Upgrade { no_backup: true, .. }
        }
    ));

    assert!(Cli::try_parse_from(["hostpanel", "themes", "copy", "aurora"]).is_err());
}

#[test]
fn test_config_set_requires_value() {
    let cli = Cli::try_parse_from(["hostpanel", "config", "set", "host.version", "1.4.0"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config {
            action: ConfigAction::Set { .. }
        }
    ));
    assert!(Cli::try_parse_from(["hostpanel", "config", "set", "host.version"]).is_err());
}
