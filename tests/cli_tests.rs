//! Integration tests for the stackssl CLI
//!
//! These tests run the actual stackssl binary and verify its behavior.
//! Each test uses an isolated temp directory passed via --ssl-dir.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const SERVICES: &[&str] = &["redis", "elasticsearch", "minio", "rabbitmq", "opencti"];

/// Create a test environment with isolated directories
struct TestEnv {
    /// Temporary directory that will be cleaned up on drop
    temp_dir: TempDir,
    /// The certificate tree
    ssl_dir: PathBuf,
    /// Config file location (absent unless a test writes it)
    config: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ssl_dir = temp_dir.path().join("ssl");
        let config = temp_dir.path().join("stackssl.toml");

        TestEnv {
            temp_dir,
            ssl_dir,
            config,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_stackssl"));
        cmd.arg("--ssl-dir")
            .arg(&self.ssl_dir)
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .current_dir(self.temp_dir.path())
            .env_remove("STACKSSL_DIR")
            .env_remove("STACKSSL_CONFIG")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }

    /// Run stackssl with stdin closed
    fn run(&self, args: &[&str]) -> Output {
        self.command(args)
            .stdin(Stdio::null())
            .output()
            .expect("Failed to execute stackssl")
    }

    /// Run stackssl and feed `input` to stdin
    fn run_with_input(&self, args: &[&str], input: &str) -> Output {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn stackssl");
        child
            .stdin
            .take()
            .expect("stdin should be piped")
            .write_all(input.as_bytes())
            .expect("Failed to write stdin");
        child.wait_with_output().expect("Failed to wait for stackssl")
    }

    fn generate(&self) {
        let output = self.run(&["generate"]);
        assert!(
            output.status.success(),
            "generate failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.ssl_dir.join(rel)
    }

    /// Every file in the tree with its contents
    fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        fn walk(dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
            for entry in std::fs::read_dir(dir).expect("Failed to read dir") {
                let path = entry.expect("Failed to read entry").path();
                if path.is_dir() {
                    walk(&path, out);
                } else {
                    let bytes = std::fs::read(&path).expect("Failed to read file");
                    out.insert(path, bytes);
                }
            }
        }

        let mut out = BTreeMap::new();
        walk(&self.ssl_dir, &mut out);
        out
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// Test: stackssl generate
// ============================================================================

#[test]
fn test_generate_creates_layout() {
    let env = TestEnv::new();

    let output = env.run(&["generate"]);
    assert!(output.status.success(), "generate failed: {}", stderr(&output));

    assert!(env.path("ca/ca.crt").exists(), "CA certificate was not created");
    assert!(env.path("ca/ca.key").exists(), "CA key was not created");
    for service in SERVICES {
        for file in [
            format!("{0}/{0}.crt", service),
            format!("{0}/{0}.key", service),
            format!("{}/ca.crt", service),
        ] {
            assert!(env.path(&file).exists(), "{} was not created", file);
        }
    }

    // MinIO expects its own file names
    assert!(env.path("minio/public.crt").exists());
    assert!(env.path("minio/private.key").exists());
    assert_eq!(
        std::fs::read(env.path("minio/public.crt")).unwrap(),
        std::fs::read(env.path("minio/minio.crt")).unwrap()
    );

    // Each CA copy matches the root
    let ca = std::fs::read(env.path("ca/ca.crt")).unwrap();
    for service in SERVICES {
        assert_eq!(std::fs::read(env.path(&format!("{}/ca.crt", service))).unwrap(), ca);
    }

    let out = stdout(&output);
    assert!(out.contains("CA created"), "unexpected output: {}", out);
    assert!(out.contains("redis certificate created"));
    assert!(!out.contains("were replaced"));
}

#[test]
fn test_generate_declined_over_existing_tree() {
    let env = TestEnv::new();
    env.generate();
    let before = env.snapshot();

    // stdin is closed, so the prompt reads EOF and declines
    let output = env.run(&["generate"]);
    assert!(
        !output.status.success(),
        "generate over an existing tree without confirmation should fail"
    );
    assert!(stderr(&output).contains("Aborted"));
    assert_eq!(env.snapshot(), before, "tree should be left intact");
}

#[test]
fn test_generate_yes_replaces_tree() {
    let env = TestEnv::new();
    env.generate();
    let original_ca = std::fs::read(env.path("ca/ca.crt")).unwrap();

    let output = env.run(&["generate", "--yes"]);
    assert!(output.status.success(), "generate --yes failed: {}", stderr(&output));
    assert!(stdout(&output).contains("The previous CA and certificates were replaced."));

    let new_ca = std::fs::read(env.path("ca/ca.crt")).unwrap();
    assert_ne!(original_ca, new_ca, "CA should be regenerated");

    // No staging or backup directories left behind
    let siblings: Vec<_> = std::fs::read_dir(env.temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(siblings, vec!["ssl"]);
}

#[test]
fn test_generate_with_custom_config() {
    let env = TestEnv::new();
    std::fs::write(
        &env.config,
        "cert_days = 90\n\n[[services]]\nname = \"nginx\"\nport = 443\nextra_sans = [\"proxy.internal\"]\n",
    )
    .unwrap();

    env.generate();
    assert!(env.path("nginx/nginx.crt").exists());
    assert!(!env.path("redis").exists());

    let output = env.run(&["info"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("proxy.internal"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let env = TestEnv::new();
    std::fs::write(&env.config, "cert_days = 0\n").unwrap();

    let output = env.run(&["generate"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error"));
    assert!(!env.ssl_dir.exists());
}

// ============================================================================
// Test: stackssl verify / clean
// ============================================================================

#[test]
fn test_verify_after_generate() {
    let env = TestEnv::new();
    env.generate();

    let output = env.run(&["verify"]);
    assert!(output.status.success(), "verify failed: {}", stdout(&output));
    assert!(stdout(&output).contains("6 verified, 0 failed"));
}

#[test]
fn test_piped_output_has_no_color_codes() {
    let env = TestEnv::new();
    env.generate();

    let output = env
        .command(&["verify"])
        .env_remove("NO_COLOR")
        .env("CLICOLOR_FORCE", "1")
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute stackssl");
    assert!(output.status.success(), "verify failed: {}", stdout(&output));
    assert!(stdout(&output).contains("6 verified, 0 failed"));
    assert!(
        !stdout(&output).contains('\x1b'),
        "unexpected escape codes: {:?}",
        stdout(&output)
    );
}

#[test]
fn test_clean_then_verify_reports_missing() {
    let env = TestEnv::new();
    env.generate();

    let output = env.run(&["clean", "--yes"]);
    assert!(output.status.success(), "clean failed: {}", stderr(&output));
    assert!(!env.ssl_dir.exists());

    let output = env.run(&["verify"]);
    assert!(!output.status.success(), "verify of a missing tree should fail");
    let out = stdout(&output);
    assert!(out.contains("0 verified, 6 failed"), "unexpected output: {}", out);
    assert_eq!(out.matches("missing").count(), 6);
}

#[test]
fn test_clean_declined_keeps_tree() {
    let env = TestEnv::new();
    env.generate();
    let before = env.snapshot();

    let output = env.run_with_input(&["clean"], "n\n");
    assert!(!output.status.success());
    assert_eq!(env.snapshot(), before);
}

#[test]
fn test_clean_missing_tree_is_ok() {
    let env = TestEnv::new();
    let output = env.run(&["clean", "--yes"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Nothing to clean"));
}

#[test]
fn test_verify_detects_certificate_from_other_ca() {
    let env = TestEnv::new();
    let other = TestEnv::new();
    env.generate();
    other.generate();

    std::fs::copy(other.path("redis/redis.crt"), env.path("redis/redis.crt")).unwrap();

    let output = env.run(&["verify"]);
    assert!(!output.status.success());
    let out = stdout(&output);
    assert!(out.contains("5 verified, 1 failed"), "unexpected output: {}", out);
    assert!(out.contains("redis:"));
}

// ============================================================================
// Test: stackssl renew
// ============================================================================

#[test]
fn test_renew_declined_leaves_tree_identical() {
    let env = TestEnv::new();
    env.generate();
    let before = env.snapshot();

    let output = env.run_with_input(&["renew"], "n\n");
    assert!(!output.status.success(), "declined renew should exit non-zero");
    assert_eq!(env.snapshot(), before, "tree should be byte-identical");
}

#[test]
fn test_renew_yes_regenerates_and_reminds() {
    let env = TestEnv::new();
    env.generate();
    let original = std::fs::read(env.path("redis/redis.crt")).unwrap();

    let output = env.run_with_input(&["renew"], "y\n");
    assert!(output.status.success(), "renew failed: {}", stderr(&output));
    assert_ne!(std::fs::read(env.path("redis/redis.crt")).unwrap(), original);
    assert!(stdout(&output).contains("docker compose restart"));

    let output = env.run(&["verify"]);
    assert!(output.status.success());
}

// ============================================================================
// Test: stackssl check-exp / info
// ============================================================================

#[test]
fn test_check_exp_output() {
    let env = TestEnv::new();
    env.generate();
    std::fs::remove_file(env.path("rabbitmq/rabbitmq.crt")).unwrap();

    let output = env.run(&["check-exp"]);
    assert!(output.status.success(), "check-exp should always exit 0");

    let out = stdout(&output);
    assert!(out.contains("critical < 30 days, warning < 90 days"));
    for name in ["ca", "redis", "opencti"] {
        assert!(out.contains(name), "missing {} in {}", name, out);
    }
    assert!(out.contains("364 days") || out.contains("365 days"));
    assert!(out.contains("missing"));
}

#[test]
fn test_check_exp_short_lived_still_exits_zero() {
    let env = TestEnv::new();
    std::fs::write(&env.config, "cert_days = 5\n").unwrap();
    env.generate();

    let output = env.run(&["check-exp"]);
    assert!(output.status.success());
}

#[test]
fn test_info_output() {
    let env = TestEnv::new();
    env.generate();

    let output = env.run(&["info"]);
    assert!(output.status.success());

    let out = stdout(&output);
    assert!(out.contains("Subject:"));
    assert!(out.contains("CN=OpenCTI Root CA"));
    assert!(out.contains("CN=redis"));
    assert!(out.contains("SANs:"));
    assert!(out.contains("localhost, 127.0.0.1, ::1"));
}

#[test]
fn test_info_without_tree() {
    let env = TestEnv::new();
    let output = env.run(&["info"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No certificates found"));
}

// ============================================================================
// Test: stackssl install-ca / diagnose / config
// ============================================================================

#[test]
fn test_install_ca_requires_root() {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } == 0 {
        return;
    }

    let env = TestEnv::new();
    env.generate();

    let output = env.run(&["install-ca"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("requires root privileges"));
}

#[test]
fn test_diagnose_without_tree() {
    let env = TestEnv::new();
    let output = env.run(&["diagnose"]);

    assert!(!output.status.success());
    assert!(stdout(&output).contains("not found"));
    assert!(stdout(&output).contains("stackssl generate"));
}

#[test]
fn test_diagnose_healthy_tree_passes() {
    let env = TestEnv::new();
    // No ports and no containers, so only files and chains are checked
    std::fs::write(
        &env.config,
        "[[services]]\nname = \"redis\"\n\n[[services]]\nname = \"minio\"\n",
    )
    .unwrap();
    env.generate();

    let output = env.run(&["diagnose"]);
    let out = stdout(&output);
    assert!(output.status.success(), "diagnose failed: {}", out);
    assert!(out.contains("Certificate files:  3/3"));
    assert!(out.contains("Valid certificates: 2/2"));
    assert!(out.contains("All certificates are valid!"));
}

#[test]
fn test_config_prints_defaults() {
    let env = TestEnv::new();
    let output = env.run(&["config"]);
    assert!(output.status.success());

    let out = stdout(&output);
    assert!(out.contains("ca_days = 3650"));
    assert!(out.contains("[[services]]"));
    assert!(out.contains("name = \"opencti\""));
}

#[test]
fn test_config_write_round_trips() {
    let env = TestEnv::new();
    let output = env.run(&["config", "--write"]);
    assert!(output.status.success(), "config --write failed: {}", stderr(&output));
    assert!(env.config.exists());

    // The written file loads and drives generation
    env.generate();
    assert!(env.path("opencti/opencti.crt").exists());
}

#[test]
fn test_ssl_dir_from_environment() {
    let env = TestEnv::new();
    let output = Command::new(env!("CARGO_BIN_EXE_stackssl"))
        .args(["--config"])
        .arg(&env.config)
        .arg("generate")
        .current_dir(env.temp_dir.path())
        .env("STACKSSL_DIR", env.temp_dir.path().join("from-env"))
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute stackssl");

    assert!(output.status.success(), "generate failed: {}", stderr(&output));
    assert!(env.temp_dir.path().join("from-env/ca/ca.crt").exists());
}

// ============================================================================
// Test: CLI surface
// ============================================================================

#[test]
fn test_unknown_subcommand_fails() {
    let env = TestEnv::new();
    let output = env.run(&["frobnicate"]);
    assert!(!output.status.success());
}

#[test]
fn test_help_lists_commands() {
    let env = TestEnv::new();
    let output = env.run(&["help"]);
    assert!(output.status.success());

    let out = stdout(&output);
    for command in [
        "generate",
        "verify",
        "info",
        "check-exp",
        "renew",
        "clean",
        "install-ca",
        "diagnose",
    ] {
        assert!(out.contains(command), "help should list {}", command);
    }
}

#[test]
fn test_completions_bash() {
    let env = TestEnv::new();
    let output = env.run(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("stackssl"));
}
