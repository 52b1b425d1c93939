use std::fs;
use std::path::Path;
use std::sync::Arc;

use cascade::config::{build_pipeline, config_base_dir, load_and_validate, load_from_path};
use cascade::{CascadeError, ExecutionMode, InterruptToken, ModuleKind, ModuleStatus};
use cascade_test_utils::{
    FakeForeignRuntime, ModuleConfigBuilder, PipelineConfigBuilder, test_controller,
    test_controller_with,
};
use serde_json::json;

fn write_config(dir: &Path, text: &str) -> std::path::PathBuf {
    let path = dir.join("Cascade.toml");
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn pipeline_file_is_loaded_and_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("shared.yaml"), "a: 1\nb: 2.5\n").unwrap();
    let path = write_config(
        dir.path(),
        r#"
        [settings]
        execution = "parallel"
        persist_cache = false

        [module.base]
        type = "sum"
        params_file = "shared.yaml"
        params = { a = 10 }

        [module.report]
        type = "dag_debug"
        after = ["base"]
        "#,
    );

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.settings.execution, ExecutionMode::Parallel);
    assert!(!cfg.settings.persist_cache);

    let ctrl = test_controller();
    let mut dag = build_pipeline(&cfg, &ctrl, &config_base_dir(&path)).unwrap();

    // Inline params win over the file.
    assert_eq!(ctrl.parameters("base").unwrap()["a"], json!(10));
    assert_eq!(ctrl.parameters("base").unwrap()["b"], json!(2.5));

    let report = ctrl.run_dag(&mut dag).unwrap();
    assert!(report.is_success());
    let names: Vec<_> = ctrl.history().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["base", "report"]);
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_from_path(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, CascadeError::Config(ref m) if m.contains("nope.toml")));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[module.a\ntype = ");
    assert!(matches!(load_from_path(&path), Err(CascadeError::Toml(_))));
}

#[test]
fn cyclic_pipeline_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
        [module.a]
        type = "sum"
        after = ["b"]

        [module.b]
        type = "sum"
        after = ["a"]
        "#,
    );
    assert!(matches!(
        load_and_validate(&path),
        Err(CascadeError::CycleDetected(_))
    ));
}

#[test]
fn unknown_dependency_is_rejected() {
    let raw = PipelineConfigBuilder::new()
        .with_module("a", ModuleConfigBuilder::new("sum").after("ghost").build())
        .build_raw();
    let err = cascade::config::PipelineConfig::try_from(raw).unwrap_err();
    assert!(matches!(
        err,
        CascadeError::UnknownDependency { ref node, ref dependency }
            if node == "a" && dependency == "ghost"
    ));
}

#[test]
fn links_to_unknown_modules_are_rejected() {
    let raw = PipelineConfigBuilder::new()
        .with_module("a", ModuleConfigBuilder::new("sum").build())
        .with_link("a", "a", "ghost", "b")
        .build_raw();
    assert!(matches!(
        cascade::config::PipelineConfig::try_from(raw),
        Err(CascadeError::Config(_))
    ));
}

#[test]
fn links_carry_values_between_configured_modules() {
    let cfg = PipelineConfigBuilder::new()
        .with_module("src", ModuleConfigBuilder::new("sum").param("a", 7).build())
        .with_module("dst", ModuleConfigBuilder::new("sum").after("src").build())
        .with_link("src", "a", "dst", "b")
        .build();
    let ctrl = test_controller();

    let mut dag = build_pipeline(&cfg, &ctrl, Path::new(".")).unwrap();
    ctrl.run_dag(&mut dag).unwrap();

    assert_eq!(ctrl.parameters("dst").unwrap()["b"], json!(7));
    assert_eq!(ctrl.param_links().len(), 1);
}

#[test]
fn unknown_types_fall_back_to_the_foreign_runtime() {
    let rt = FakeForeignRuntime::with_types(&["NativeSkim"]);
    rt.add_module("skim", "NativeSkim", "{}");
    let rt = Arc::new(rt);
    let ctrl = test_controller_with(InterruptToken::new(), Some(rt.clone()));

    let cfg = PipelineConfigBuilder::new()
        .with_module("skim", ModuleConfigBuilder::new("NativeSkim").build())
        .with_module("total", ModuleConfigBuilder::new("sum").after("skim").build())
        .build();

    let mut dag = build_pipeline(&cfg, &ctrl, Path::new(".")).unwrap();
    let report = ctrl.run_dag(&mut dag).unwrap();

    assert!(report.is_success());
    assert_eq!(rt.runs(), vec!["skim"]);
    assert_eq!(ctrl.history()[0].kind, ModuleKind::Foreign);
    assert_eq!(ctrl.get_status("total").unwrap(), ModuleStatus::Done);
}

#[test]
fn unknown_type_without_foreign_module_fails() {
    let cfg = PipelineConfigBuilder::new()
        .with_module("x", ModuleConfigBuilder::new("warp_drive").build())
        .build();
    let err = build_pipeline(&cfg, &test_controller(), Path::new(".")).unwrap_err();
    assert!(matches!(err, CascadeError::UnknownModuleType(_)));
}
