//! Tests for environment layering.

use super::*;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Canned shell: returns the same capture for every request.
struct FakeShell(ShellCapture);

impl ShellSource for FakeShell {
    async fn capture(&self, _request: &ShellRequest, _env: &EnvMap) -> ShellCapture {
        self.0.clone()
    }
}

fn map(pairs: &[(&str, &str)]) -> EnvMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn required(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Base env with a PATH that can locate a real `sh`, so the shell request
/// resolves; the fake never runs it.
fn base(extra: &[(&str, &str)]) -> EnvMap {
    let mut env = map(&[("PATH", "/usr/bin:/bin"), ("HOME", "/nonexistent-home")]);
    env.extend(map(extra));
    env
}

fn shell_options() -> EnvOptions {
    EnvOptions {
        shell: Some("sh".to_string()),
        shell_rc_files: Some(Vec::new()),
        ..Default::default()
    }
}

fn no_shell_options() -> EnvOptions {
    EnvOptions {
        source_shell_env: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_base_passes_through_untouched() {
    let env = base(&[("A", "1")]);
    let spec = build(env.clone(), &no_shell_options(), &FakeShell(ShellCapture::default()))
        .await
        .unwrap();
    assert_eq!(spec.vars(), &env);
    assert!(spec.diagnostics().is_empty());
}

#[tokio::test]
async fn test_shell_fills_missing_but_keeps_existing() {
    let shell = FakeShell(ShellCapture::ok(map(&[
        ("A", "from-shell"),
        ("NEW", "from-shell"),
        ("PATH", "/shell/bin:/usr/bin:/bin"),
    ])));

    let spec = build(base(&[("A", "from-base")]), &shell_options(), &shell)
        .await
        .unwrap();

    assert_eq!(spec.get("A"), Some("from-base"));
    assert_eq!(spec.get("NEW"), Some("from-shell"));
    assert_eq!(spec.get("PATH"), Some("/shell/bin:/usr/bin:/bin"));
}

#[tokio::test]
async fn test_shell_override_replaces_existing() {
    let shell = FakeShell(ShellCapture::ok(map(&[("A", "from-shell")])));
    let options = EnvOptions {
        shell_env_override: true,
        ..shell_options()
    };

    let spec = build(base(&[("A", "from-base")]), &options, &shell)
        .await
        .unwrap();
    assert_eq!(spec.get("A"), Some("from-shell"));
}

#[tokio::test]
async fn test_path_refreshed_regardless_of_override() {
    for override_all in [false, true] {
        let shell = FakeShell(ShellCapture::ok(map(&[("PATH", "/from/shell")])));
        let options = EnvOptions {
            shell_env_override: override_all,
            ..shell_options()
        };

        let spec = build(base(&[]), &options, &shell).await.unwrap();
        assert_eq!(spec.get("PATH"), Some("/from/shell"), "override={override_all}");
    }
}

#[tokio::test]
async fn test_shell_path_outranks_overriding_dotenv() {
    let temp_dir = TempDir::new().unwrap();
    let dotenv = temp_dir.path().join("t.env");
    std::fs::write(&dotenv, "PATH=/from/dotenv\nB=from-dotenv\n").unwrap();

    let shell = FakeShell(ShellCapture::ok(map(&[("PATH", "/from/shell")])));
    let options = EnvOptions {
        load_dotenv: true,
        dotenv_path: dotenv,
        dotenv_override: true,
        ..shell_options()
    };

    let spec = build(base(&[]), &options, &shell).await.unwrap();
    assert_eq!(spec.get("PATH"), Some("/from/shell"));
    assert_eq!(spec.get("B"), Some("from-dotenv"));
}

#[tokio::test]
async fn test_partial_shell_path_outranks_overriding_dotenv() {
    let temp_dir = TempDir::new().unwrap();
    let dotenv = temp_dir.path().join("t.env");
    std::fs::write(&dotenv, "PATH=/from/dotenv\n").unwrap();

    let shell = FakeShell(ShellCapture::failed(map(&[("PATH", "/partial/bin")]), "timed out"));
    let options = EnvOptions {
        load_dotenv: true,
        dotenv_path: dotenv,
        dotenv_override: true,
        ..shell_options()
    };

    let spec = build(base(&[]), &options, &shell).await.unwrap();
    assert_eq!(spec.get("PATH"), Some("/partial/bin"));
}

#[tokio::test]
async fn test_overriding_dotenv_sets_path_without_shell() {
    let temp_dir = TempDir::new().unwrap();
    let dotenv = temp_dir.path().join("t.env");
    std::fs::write(&dotenv, "PATH=/from/dotenv\n").unwrap();

    let options = EnvOptions {
        load_dotenv: true,
        dotenv_path: dotenv,
        dotenv_override: true,
        ..no_shell_options()
    };

    let spec = build(base(&[]), &options, &FakeShell(ShellCapture::default()))
        .await
        .unwrap();
    assert_eq!(spec.get("PATH"), Some("/from/dotenv"));
}

#[tokio::test]
async fn test_build_cached_reuses_dotenv() {
    let temp_dir = TempDir::new().unwrap();
    let dotenv = temp_dir.path().join(".env");
    std::fs::write(&dotenv, "A=1\n").unwrap();

    let options = EnvOptions {
        load_dotenv: true,
        dotenv_path: dotenv,
        ..no_shell_options()
    };
    let cache = DotenvCache::new();
    let shell = FakeShell(ShellCapture::default());

    let first = build_cached(base(&[]), &options, &shell, &cache).await.unwrap();
    let second = build_cached(base(&[]), &options, &shell, &cache).await.unwrap();
    assert_eq!(first.get("A"), Some("1"));
    assert_eq!(first, second);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_failed_shell_is_soft_and_only_refreshes_path() {
    let shell = FakeShell(ShellCapture::failed(
        map(&[("PATH", "/partial/bin"), ("SECRET", "partial")]),
        "timed out",
    ));

    let spec = build(base(&[]), &shell_options(), &shell).await.unwrap();

    assert_eq!(spec.get("PATH"), Some("/partial/bin"));
    assert_eq!(spec.get("SECRET"), None);
    assert_eq!(spec.diagnostics(), ["timed out".to_string()]);
}

#[tokio::test]
async fn test_failed_shell_without_output_keeps_base_path() {
    let shell = FakeShell(ShellCapture::failed(EnvMap::new(), "exit 1"));
    let spec = build(base(&[]), &shell_options(), &shell).await.unwrap();
    assert_eq!(spec.get("PATH"), Some("/usr/bin:/bin"));
}

#[tokio::test]
async fn test_dotenv_fill_only_never_replaces() {
    let temp_dir = TempDir::new().unwrap();
    let dotenv = temp_dir.path().join(".env");
    std::fs::write(&dotenv, "A=from-dotenv\nB=from-dotenv\nC=from-dotenv\n").unwrap();

    let shell = FakeShell(ShellCapture::ok(map(&[("B", "from-shell")])));
    let options = EnvOptions {
        load_dotenv: true,
        dotenv_path: dotenv,
        ..shell_options()
    };

    let spec = build(base(&[("A", "from-base")]), &options, &shell)
        .await
        .unwrap();
    assert_eq!(spec.get("A"), Some("from-base"));
    assert_eq!(spec.get("B"), Some("from-shell"));
    assert_eq!(spec.get("C"), Some("from-dotenv"));
}

#[tokio::test]
async fn test_dotenv_override_always_replaces() {
    let temp_dir = TempDir::new().unwrap();
    let dotenv = temp_dir.path().join(".env");
    std::fs::write(&dotenv, "A=from-dotenv\nB=from-dotenv\n").unwrap();

    let shell = FakeShell(ShellCapture::ok(map(&[("B", "from-shell")])));
    let options = EnvOptions {
        load_dotenv: true,
        dotenv_path: dotenv,
        dotenv_override: true,
        ..shell_options()
    };

    let spec = build(base(&[("A", "from-base")]), &options, &shell)
        .await
        .unwrap();
    assert_eq!(spec.get("A"), Some("from-dotenv"));
    assert_eq!(spec.get("B"), Some("from-dotenv"));
}

#[tokio::test]
async fn test_required_var_supplied_by_dotenv() {
    let temp_dir = TempDir::new().unwrap();
    let dotenv = temp_dir.path().join("t.env");
    std::fs::write(&dotenv, "X=1\n").unwrap();

    let options = EnvOptions {
        load_dotenv: true,
        dotenv_path: dotenv,
        required_vars: required(&["X"]),
        ..no_shell_options()
    };

    let spec = build(EnvMap::new(), &options, &FakeShell(ShellCapture::default()))
        .await
        .unwrap();
    assert_eq!(spec.get("X"), Some("1"));
}

#[tokio::test]
async fn test_required_var_missing_when_dotenv_absent() {
    let temp_dir = TempDir::new().unwrap();
    let options = EnvOptions {
        load_dotenv: true,
        dotenv_path: temp_dir.path().join("t.env"),
        required_vars: required(&["X"]),
        ..no_shell_options()
    };

    let err = build(EnvMap::new(), &options, &FakeShell(ShellCapture::default()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        crate::error::EnvironmentError::MissingVariables {
            missing: vec!["X".to_string()]
        }
    );
}

#[tokio::test]
async fn test_required_check_fails_iff_any_missing() {
    let cases: Vec<(&[&str], &[(&str, &str)], Option<&[&str]>)> = vec![
        (&[][..], &[][..], None),
        (&["A"][..], &[("A", "1")][..], None),
        (&["A", "B"][..], &[("A", "1")][..], Some(&["B"][..])),
        (&["B", "A"][..], &[][..], Some(&["A", "B"][..])),
        (&["A"][..], &[("A", "")][..], Some(&["A"][..])),
    ];

    for (names, vars, expected_missing) in cases {
        let options = EnvOptions {
            required_vars: required(names),
            ..no_shell_options()
        };
        let result = build(map(vars), &options, &FakeShell(ShellCapture::default())).await;
        match expected_missing {
            None => assert!(result.is_ok(), "names={names:?} vars={vars:?}"),
            Some(missing) => {
                let err = result.unwrap_err();
                let crate::error::EnvironmentError::MissingVariables { missing: got } = &err;
                assert_eq!(got, &missing.iter().map(|s| s.to_string()).collect::<Vec<_>>());
            }
        }
    }
}

#[tokio::test]
async fn test_required_var_supplied_by_shell() {
    let shell = FakeShell(ShellCapture::ok(map(&[("API_KEY", "sk-123")])));
    let options = EnvOptions {
        required_vars: required(&["API_KEY"]),
        ..shell_options()
    };

    let spec = build(base(&[]), &options, &shell).await.unwrap();
    assert_eq!(spec.get("API_KEY"), Some("sk-123"));
}

#[test]
fn test_options_from_env_map_defaults() {
    let options = EnvOptions::from_env_map(&EnvMap::new());
    assert_eq!(options, EnvOptions::default());
    assert!(options.source_shell_env);
    assert!(!options.load_dotenv);
    assert_eq!(options.dotenv_path, PathBuf::from(".env"));
    assert_eq!(options.shell_timeout, Duration::from_secs(5));
}

#[test]
fn test_options_from_env_map() {
    let env = map(&[
        ("SUBAGENT_LOAD_DOTENV", "yes"),
        ("SUBAGENT_DOTENV_PATH", "config/agent.env"),
        ("SUBAGENT_DOTENV_OVERRIDE", "ON"),
        ("SUBAGENT_SOURCE_SHELL_ENV", "0"),
        ("SUBAGENT_SHELL_RC_FILES", ".zshrc, ,~/.secrets"),
        ("SUBAGENT_SHELL", "/bin/bash"),
        ("SUBAGENT_SHELL_ENV_TIMEOUT_SECONDS", "0.01"),
        ("SUBAGENT_SHELL_ENV_OVERRIDE", "true"),
        ("SUBAGENT_REQUIRED_ENV_VARS", "OPENAI_API_KEY, OTHER"),
    ]);

    let options = EnvOptions::from_env_map(&env);
    assert!(options.load_dotenv);
    assert_eq!(options.dotenv_path, PathBuf::from("config/agent.env"));
    assert!(options.dotenv_override);
    assert!(!options.source_shell_env);
    assert_eq!(
        options.shell_rc_files,
        Some(vec![PathBuf::from(".zshrc"), PathBuf::from("~/.secrets")])
    );
    assert_eq!(options.shell.as_deref(), Some("/bin/bash"));
    assert_eq!(options.shell_timeout, Duration::from_millis(100));
    assert!(options.shell_env_override);
    assert_eq!(options.required_vars, required(&["OPENAI_API_KEY", "OTHER"]));
}

#[test]
fn test_unrecognised_shell_toggle_keeps_sourcing_enabled() {
    let options = EnvOptions::from_env_map(&map(&[("SUBAGENT_SOURCE_SHELL_ENV", "maybe")]));
    assert!(options.source_shell_env);
}

#[test]
fn test_bad_timeout_falls_back_to_default() {
    let options =
        EnvOptions::from_env_map(&map(&[("SUBAGENT_SHELL_ENV_TIMEOUT_SECONDS", "soon")]));
    assert_eq!(options.shell_timeout, Duration::from_secs(5));
}

#[test]
fn test_for_workdir_anchors_relative_dotenv() {
    let options = EnvOptions::default().for_workdir(std::path::Path::new("/work"));
    assert_eq!(options.dotenv_path, PathBuf::from("/work/.env"));

    let absolute = EnvOptions {
        dotenv_path: PathBuf::from("/etc/agent.env"),
        ..Default::default()
    }
    .for_workdir(std::path::Path::new("/work"));
    assert_eq!(absolute.dotenv_path, PathBuf::from("/etc/agent.env"));
}

#[test]
fn test_truthy_and_falsy() {
    for value in ["1", "true", "YES", " y ", "On"] {
        assert!(is_truthy(Some(value)), "{value}");
        assert!(!is_falsy(Some(value)), "{value}");
    }
    for value in ["0", "false", "No", "n", "OFF"] {
        assert!(is_falsy(Some(value)), "{value}");
        assert!(!is_truthy(Some(value)), "{value}");
    }
    assert!(!is_truthy(None));
    assert!(!is_falsy(None));
    assert!(!is_truthy(Some("maybe")));
    assert!(!is_falsy(Some("maybe")));
}

#[test]
fn test_split_csv() {
    assert_eq!(split_csv("a, b,,c ,"), vec!["a", "b", "c"]);
    assert!(split_csv("").is_empty());
}
