use crate::common::*;
use apkdock::error::ApkDockError;
use apkdock::parser::Severity;
use apkdock::runtime::RunStatus;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SECUREAPK_OUTPUT: &str = "\
[!] Hardcoded API Key detected in com/example/Config.java (line 42): apiKey = \"AKIA...\"
└ Exploitation Risk: Credentials can be extracted from the APK
";

#[tokio::test]
async fn test_secureapk_success_returns_result_and_findings() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(inv, "vulnerabilities.txt", SECUREAPK_OUTPUT);
        RunStatus::Success
    }));
    let orch = orchestrator(&config, runtime.clone());

    let report = orch
        .analyze("secureapk", apk_upload("demo.apk", "one"))
        .await
        .unwrap();

    assert_eq!(report.tool, "secureapk");
    assert_eq!(report.filename, "demo.apk");
    assert!(report.completed);
    assert_eq!(report.results, SECUREAPK_OUTPUT);

    let findings = report.findings.expect("secureapk has a dialect");
    assert_eq!(findings.dialect, "narrative");
    assert_eq!(findings.vulnerabilities.len(), 1);
    let vuln = &findings.vulnerabilities[0];
    assert_eq!(vuln.kind, "Hardcoded API Key");
    assert_eq!(vuln.line, Some(42));
    assert_eq!(vuln.severity, Severity::High);

    let inv = runtime.last_invocation();
    assert_eq!(inv.image, "devrvk/secureapk:amd64");
    assert!(inv.args.is_empty());
    assert!(inv.remove);
    assert!(inv.name.starts_with("apkdock-"));
    assert!(inv.input_dir.is_absolute());
    assert!(inv.output_dir.is_absolute());
}

#[tokio::test]
async fn test_upload_is_staged_under_original_name() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, input| {
        assert_eq!(input.len(), 1);
        assert_eq!(input[0].0, "My App.apk");
        assert_eq!(&input[0].1[..4], b"PK\x03\x04");
        write_output(inv, "vulnerabilities.txt", SECUREAPK_OUTPUT);
        RunStatus::Success
    }));
    let orch = orchestrator(&config, runtime.clone());

    let outcome = orch
        .run("secureapk", apk_upload("My App.apk", "spaces"))
        .await
        .unwrap();
    assert!(outcome.completed);
    assert_eq!(runtime.calls(), 1);
}

#[tokio::test]
async fn test_reconizex_reads_nested_result() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(
            inv,
            "demo/non-info.txt",
            "[Crypto] [Config.java] [high] Weak cipher mode\n",
        );
        RunStatus::Success
    }));
    let orch = orchestrator(&config, runtime.clone());

    let report = orch
        .analyze("reconizex", apk_upload("demo.apk", "nested"))
        .await
        .unwrap();

    assert!(report.completed);
    assert_eq!(report.results, "[Crypto] [Config.java] [high] Weak cipher mode\n");
    let findings = report.findings.unwrap();
    assert_eq!(findings.dialect, "tagged-line");
    assert_eq!(findings.vulnerabilities[0].severity, Severity::High);

    let inv = runtime.last_invocation();
    assert_eq!(inv.image, "devrvk/reconizerx-docker:amd64");
    assert_eq!(inv.args, vec!["demo.apk".to_string()]);
}

#[tokio::test]
async fn test_reconizex_overflow_uses_fallback_file() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(inv, "demo/nuk.txt", "[Log] [Main.java] [low] Partial output\n");
        RunStatus::OutputOverflow
    }));
    let orch = orchestrator(&config, runtime.clone());

    let outcome = orch
        .run("reconizex", apk_upload("demo.apk", "overflow"))
        .await
        .unwrap();

    assert!(!outcome.completed);
    assert_eq!(outcome.raw_text, "[Log] [Main.java] [low] Partial output\n");
    // The container outlives its CLI and must be stopped explicitly.
    assert_eq!(runtime.kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_overflow_ignores_complete_result_file() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(inv, "demo/non-info.txt", "[A] [a.java] [high] complete\n");
        write_output(inv, "demo/nuk.txt", "[B] [b.java] [low] partial\n");
        RunStatus::OutputOverflow
    }));
    let orch = orchestrator(&config, runtime);

    let outcome = orch
        .run("reconizex", apk_upload("demo.apk", "both"))
        .await
        .unwrap();
    assert!(!outcome.completed);
    assert_eq!(outcome.raw_text, "[B] [b.java] [low] partial\n");
}

#[tokio::test]
async fn test_secureapk_overflow_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(inv, "vulnerabilities.txt", SECUREAPK_OUTPUT);
        RunStatus::OutputOverflow
    }));
    let orch = orchestrator(&config, runtime.clone());

    let err = orch
        .run("secureapk", apk_upload("demo.apk", "overflow"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApkDockError::Execution { .. }));
    assert_eq!(err.status_code(), 500);
    assert_eq!(runtime.kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clean_exit_does_not_kill() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(inv, "vulnerabilities.txt", SECUREAPK_OUTPUT);
        RunStatus::Success
    }));
    let orch = orchestrator(&config, runtime.clone());

    orch.run("secureapk", apk_upload("demo.apk", "ok")).await.unwrap();
    assert_eq!(runtime.kills.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_nonzero_exit_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        // A result file left behind by a failed run must not be returned.
        write_output(inv, "demo/non-info.txt", "[A] [a.java] [high] stale\n");
        RunStatus::Failed { exit_code: Some(2) }
    }));
    let orch = orchestrator(&config, runtime);

    let err = orch
        .run("reconizex", apk_upload("demo.apk", "exit"))
        .await
        .unwrap_err();
    match err {
        ApkDockError::Execution { tool, reason } => {
            assert_eq!(tool, "ReconizeX");
            assert!(reason.contains('2'));
        }
        other => panic!("expected execution error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_kills_container() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(
        ScriptedRuntime::new(|inv, _| {
            write_output(inv, "vulnerabilities.txt", SECUREAPK_OUTPUT);
            RunStatus::Success
        })
        .with_delay(Duration::from_secs(5)),
    );
    let orch = orchestrator(&config, runtime.clone()).with_run_timeout(Duration::from_millis(100));

    let err = orch
        .run("secureapk", apk_upload("demo.apk", "slow"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApkDockError::Timeout { .. }));
    assert_eq!(runtime.kills.load(Ordering::SeqCst), 1);
    assert_eq!(count_entries(&jobs_dir(tmp.path(), "secureapk")), 0);
}

#[tokio::test]
async fn test_missing_result_file() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|_, _| RunStatus::Success));
    let orch = orchestrator(&config, runtime);

    let err = orch
        .run("secureapk", apk_upload("demo.apk", "nothing"))
        .await
        .unwrap_err();
    match err {
        ApkDockError::ResultMissing { tool, path } => {
            assert_eq!(tool, "SecureApk");
            assert!(path.ends_with("vulnerabilities.txt"));
        }
        other => panic!("expected missing result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_fallback_file() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|_, _| RunStatus::OutputOverflow));
    let orch = orchestrator(&config, runtime);

    let err = orch
        .run("reconizex", apk_upload("demo.apk", "nothing"))
        .await
        .unwrap_err();
    match err {
        ApkDockError::ResultMissing { path, .. } => assert!(path.ends_with("nuk.txt")),
        other => panic!("expected missing result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_result_file() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(inv, "vulnerabilities.txt", "  \n\n");
        RunStatus::Success
    }));
    let orch = orchestrator(&config, runtime);

    let err = orch
        .run("secureapk", apk_upload("demo.apk", "empty"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApkDockError::EmptyResult { .. }));
}

#[tokio::test]
async fn test_unreadable_result_path_is_io_error() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        // A file where the nested result directory should be.
        write_output(inv, "demo", "not a directory");
        RunStatus::Success
    }));
    let orch = orchestrator(&config, runtime);

    let err = orch
        .run("reconizex", apk_upload("demo.apk", "notdir"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApkDockError::Io(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_result_with_bom_is_decoded() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(inv, "vulnerabilities.txt", &format!("\u{feff}{}", SECUREAPK_OUTPUT));
        RunStatus::Success
    }));
    let orch = orchestrator(&config, runtime);

    let outcome = orch
        .run("secureapk", apk_upload("demo.apk", "bom"))
        .await
        .unwrap();
    assert_eq!(outcome.raw_text, SECUREAPK_OUTPUT);
}

#[tokio::test]
async fn test_validation_rejects_before_runtime() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.limits.max_upload_bytes = 16;
    let runtime = Arc::new(ScriptedRuntime::new(|_, _| RunStatus::Success));
    let orch = orchestrator(&config, runtime.clone());

    let wrong_ext = orch.run("secureapk", apk_upload("demo.zip", "x")).await;
    assert!(matches!(wrong_ext, Err(ApkDockError::Validation(_))));

    let traversal = orch.run("secureapk", apk_upload("../demo.apk", "x")).await;
    assert!(matches!(traversal, Err(ApkDockError::Validation(_))));

    let oversize = orch
        .run("secureapk", apk_upload("demo.apk", "this is far too large"))
        .await;
    let err = oversize.unwrap_err();
    assert!(matches!(err, ApkDockError::Validation(_)));
    assert_eq!(err.status_code(), 400);

    assert_eq!(runtime.calls(), 0);
}

#[tokio::test]
async fn test_upload_at_exact_limit_is_accepted() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    // "PK\x03\x04" plus four marker bytes.
    config.limits.max_upload_bytes = 8;
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(inv, "vulnerabilities.txt", SECUREAPK_OUTPUT);
        RunStatus::Success
    }));
    let orch = orchestrator(&config, runtime);

    assert!(orch.run("secureapk", apk_upload("demo.apk", "four")).await.is_ok());
}

#[tokio::test]
async fn test_unknown_tool() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|_, _| RunStatus::Success));
    let orch = orchestrator(&config, runtime.clone());

    let err = orch
        .analyze("mobsf", apk_upload("demo.apk", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApkDockError::UnknownTool(ref id) if id == "mobsf"));
    assert_eq!(err.status_code(), 404);
    assert_eq!(runtime.calls(), 0);
}

#[tokio::test]
async fn test_job_directories_are_removed() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = Arc::new(ScriptedRuntime::new(|inv, _| {
        write_output(inv, "demo/non-info.txt", "[A] [a.java] [low] ok\n");
        RunStatus::Success
    }));
    let orch = orchestrator(&config, runtime.clone());
    orch.prepare().await.unwrap();

    orch.run("reconizex", apk_upload("demo.apk", "ok")).await.unwrap();
    let _ = orch.run("reconizex", apk_upload("other.apk", "missing")).await;

    assert_eq!(runtime.calls(), 2);
    assert_eq!(count_entries(&jobs_dir(tmp.path(), "reconizex")), 0);
}

#[tokio::test]
async fn test_sweep_stale_removes_leftovers() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let stale = jobs_dir(tmp.path(), "secureapk").join("left-behind");
    std::fs::create_dir_all(stale.join("output")).unwrap();
    std::fs::write(stale.join("output/vulnerabilities.txt"), "old").unwrap();

    let runtime = Arc::new(ScriptedRuntime::new(|_, _| RunStatus::Success));
    let orch = orchestrator(&config, runtime);
    orch.prepare().await.unwrap();
    assert!(stale.exists());

    assert_eq!(orch.sweep_stale().await.unwrap(), 1);
    assert!(!stale.exists());
    assert!(jobs_dir(tmp.path(), "reconizex").is_dir());
}

#[tokio::test]
async fn test_prepare_leaves_jobs_of_another_orchestrator() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let serving = Arc::new(
        ScriptedRuntime::new(|inv, _| {
            if !inv.input_dir.join("demo.apk").exists() {
                return RunStatus::Failed { exit_code: Some(1) };
            }
            write_output(inv, "vulnerabilities.txt", SECUREAPK_OUTPUT);
            RunStatus::Success
        })
        .with_delay(Duration::from_millis(300)),
    );
    let server = orchestrator(&config, serving);
    let cli = orchestrator(
        &config,
        Arc::new(ScriptedRuntime::new(|_, _| RunStatus::Success)),
    );
    server.prepare().await.unwrap();

    let (outcome, prepared) = tokio::join!(
        server.run("secureapk", apk_upload("demo.apk", "live")),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cli.prepare().await
        }
    );

    prepared.unwrap();
    let outcome = outcome.unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.raw_text, SECUREAPK_OUTPUT);
}
