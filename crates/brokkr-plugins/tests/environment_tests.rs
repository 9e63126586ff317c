//! Environment materialization integration tests

mod common;

use brokkr_plugins::environment::CACHE_MARKER_SUFFIX;
use brokkr_plugins::{materialize, EnvironmentMap, MaterializeOptions, PluginEnvContext};
use common::TestBase;
use serial_test::serial;
use std::fs;

fn full_opts() -> MaterializeOptions {
    MaterializeOptions::default()
}

fn cached_opts() -> MaterializeOptions {
    MaterializeOptions {
        use_cache: true,
        ..MaterializeOptions::default()
    }
}

#[test]
fn test_custom_key_exported_under_both_namings() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let artifact = tb.build_artifact("plugin1", "\n[custom]\nfoo = bar\n");
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let map = materialize(&mut plugin, &full_opts()).unwrap();
    assert_eq!(map.get("GENERIC_CURRENT_PLUGIN_CUSTOM_FOO"), Some("bar"));
    assert_eq!(map.get("GENERIC_PLUGIN_PLUGIN1_CUSTOM_FOO"), Some("bar"));
}

#[test]
fn test_current_keys_and_tmpdir() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let artifact = tb.build_artifact("plugin1", "");
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let map = materialize(&mut plugin, &full_opts()).unwrap();
    assert_eq!(map.get("GENERIC_CURRENT_PLUGIN_NAME"), Some("plugin1"));
    assert_eq!(
        map.get("GENERIC_CURRENT_PLUGIN_LABEL"),
        Some("plugin_plugin1@generic")
    );
    let dir = map.get("GENERIC_CURRENT_PLUGIN_DIR").unwrap();
    assert!(dir.ends_with("plugin1"));
    let tmpdir = map.get("TMPDIR").unwrap();
    assert!(tmpdir.ends_with("tmp/plugin1"));
    assert!(std::path::Path::new(tmpdir).is_dir());
}

#[test]
fn test_without_current_keys() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let artifact = tb.build_artifact("plugin1", "");
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let opts = MaterializeOptions {
        add_current_env_keys: false,
        set_tmp_dir: false,
        use_cache: false,
    };
    let map = materialize(&mut plugin, &opts).unwrap();
    assert!(map.get("GENERIC_CURRENT_PLUGIN_NAME").is_none());
    assert!(map.get("TMPDIR").is_none());
}

#[test]
#[serial]
fn test_cache_hit_identical_except_marker() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let artifact = tb.build_artifact("plugin1", "\n[custom]\nfoo = bar\n");
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let first = materialize(&mut plugin, &cached_opts()).unwrap();
    let marker = format!("GENERIC{CACHE_MARKER_SUFFIX}");
    assert!(first.get(&marker).is_none());

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let second = materialize(&mut plugin, &cached_opts()).unwrap();
    assert_eq!(second.get(&marker), Some("1"));

    let mut second_without_marker = EnvironmentMap::new();
    for (k, v) in second.iter() {
        if k != marker {
            second_without_marker.set(k, v);
        }
    }
    assert_eq!(first, second_without_marker);
}

#[test]
#[serial]
fn test_cache_invalidated_by_config_change() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let artifact = tb.build_artifact("plugin1", "\n[custom]\nfoo = bar\n");
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    materialize(&mut plugin, &cached_opts()).unwrap();

    // a runtime override changes one contributing source
    let override_path = tb.module_env.runtime_override_path("plugin1");
    fs::create_dir_all(override_path.parent().unwrap()).unwrap();
    fs::write(&override_path, "[custom]\nfoo = overridden\n").unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let map = materialize(&mut plugin, &cached_opts()).unwrap();
    let marker = format!("GENERIC{CACHE_MARKER_SUFFIX}");
    assert!(map.get(&marker).is_none(), "stale cache must not be served");
    assert_eq!(map.get("GENERIC_PLUGIN_PLUGIN1_CUSTOM_FOO"), Some("overridden"));
}

#[test]
fn test_dependency_environment_merged_without_current_keys() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    for (name, extra) in [
        ("dep1", "\n[custom]\ndepkey = from_dep\n"),
        ("plugin2", "\n[custom]\nownkey = own\n"),
    ] {
        let artifact = tb.build_artifact(name, extra);
        manager.install_plugin(&artifact, None).unwrap().unwrap();
    }
    // declare plugin2 -> dep1
    let deps_path = tb.base_dir.join("plugin2").join(".layerapi2_dependencies");
    fs::write(deps_path.as_std_path(), "plugin_dep1@generic\n").unwrap();

    let mut plugin = manager.get_plugin("plugin2").unwrap();
    let map = materialize(&mut plugin, &full_opts()).unwrap();
    // the dependency's exported keys are merged in...
    assert_eq!(map.get("GENERIC_PLUGIN_DEP1_CUSTOM_DEPKEY"), Some("from_dep"));
    assert_eq!(map.get("GENERIC_PLUGIN_PLUGIN2_CUSTOM_OWNKEY"), Some("own"));
    // ...but the current-plugin keys belong to plugin2 alone
    assert_eq!(map.get("GENERIC_CURRENT_PLUGIN_NAME"), Some("plugin2"));
    assert!(map.get("GENERIC_CURRENT_PLUGIN_CUSTOM_DEPKEY").is_none());
}

#[test]
fn test_unresolvable_dependency_skipped() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let artifact = tb.build_artifact("plugin1", "");
    manager.install_plugin(&artifact, None).unwrap().unwrap();
    let deps_path = tb.base_dir.join("plugin1").join(".layerapi2_dependencies");
    fs::write(
        deps_path.as_std_path(),
        "- plugin_ghost@generic\nlayer_not_a_plugin@generic\n",
    )
    .unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    // neither the missing optional dependency nor the foreign label is fatal
    let map = materialize(&mut plugin, &full_opts()).unwrap();
    assert_eq!(map.get("GENERIC_CURRENT_PLUGIN_NAME"), Some("plugin1"));
}

#[test]
#[serial]
fn test_env_context_scopes_materialized_environment() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let artifact = tb.build_artifact("plugin1", "\n[custom]\nfoo = bar\n");
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let map = materialize(&mut plugin, &full_opts()).unwrap();
    assert!(std::env::var("GENERIC_CURRENT_PLUGIN_NAME").is_err());
    {
        let _guard = PluginEnvContext::enter(map.iter());
        assert_eq!(
            std::env::var("GENERIC_CURRENT_PLUGIN_NAME").unwrap(),
            "plugin1"
        );
        assert_eq!(
            std::env::var("GENERIC_PLUGIN_PLUGIN1_CUSTOM_FOO").unwrap(),
            "bar"
        );
    }
    assert!(std::env::var("GENERIC_CURRENT_PLUGIN_NAME").is_err());
}
