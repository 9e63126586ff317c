//! End-to-end configuration pipeline tests

mod common;

use brokkr_core::Error;
use common::TestBase;
use std::fs;

#[test]
fn test_full_pipeline_with_commands() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let extra = "\n\
[app_web]\n\
_cmd_and_args = serve --dir {plugin_dir} --name {app_name}\n\
numprocesses = 3\n\
log_split_multiple_workers = 1\n\
\n\
[extra_daemon_sync]\n\
_cmd_and_args = syncd --plugin {plugin_name}\n";
    let artifact = tb.build_artifact("plugin1", extra);
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let configuration = plugin.configuration().unwrap();
    assert_eq!(configuration.apps().unwrap().len(), 1);
    assert_eq!(configuration.extra_daemons().unwrap().len(), 1);

    let commands = configuration.commands().unwrap();
    let web = &commands[0];
    assert_eq!(web.name(), "web");
    assert_eq!(web.numprocesses(), 3);
    let invocation = web.launch_invocation(&tb.module_env);
    assert!(invocation.contains("--use-locks"));
    assert!(invocation.contains("_worker{worker}"));
    assert!(invocation.contains("plugin_wrapper --cwd plugin1"));
    assert!(invocation.contains("--name web"));

    let sync = &commands[1];
    assert_eq!(sync.numprocesses(), 1);
    let invocation = sync.launch_invocation(&tb.module_env);
    assert!(!invocation.contains("--use-locks"));
    assert!(invocation.contains("syncd --plugin plugin1"));
}

#[test]
fn test_bad_configuration_blocks_install() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    // valid at build time, broken after extraction via a runtime override
    let artifact = tb.build_artifact("plugin1", "");
    let override_path = tb.module_env.runtime_override_path("plugin1");
    fs::create_dir_all(override_path.parent().unwrap()).unwrap();
    fs::write(&override_path, "[app_web]\nnumprocesses = lots\n").unwrap();

    let err = manager.install_plugin(&artifact, None).unwrap_err();
    assert!(matches!(err, Error::BadPlugin { .. }));
    assert!(err.to_string().contains("numprocesses"));
    // rolled back
    assert!(matches!(
        manager.get_plugin("plugin1").unwrap_err(),
        Error::NotInstalledPlugin { .. }
    ));
}

#[test]
fn test_hostname_derivation_with_system_resolver() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let extra = "\n[custom]\nhostname = null\ndb_hostname = /var/run/db.sock\n";
    let artifact = tb.build_artifact("plugin1", extra);
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let doc = plugin.configuration().unwrap().document().unwrap();
    // "null" and socket paths pass through resolve() unchanged
    assert_eq!(
        doc.get("custom", "hostname_ip").unwrap().as_str(),
        Some("null")
    );
    assert_eq!(
        doc.get("custom", "db_hostname_ip").unwrap().as_str(),
        Some("/var/run/db.sock")
    );
}

#[test]
fn test_localhost_resolves_to_ipv4() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let artifact = tb.build_artifact("plugin1", "\n[custom]\nhostname = localhost\n");
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    let doc = plugin.configuration().unwrap().document().unwrap();
    let ip = doc.get("custom", "hostname_ip").unwrap().as_str().unwrap();
    // either a real loopback address or, on machines without a resolver,
    // the sentinel -- never a missing key
    assert!(ip == "127.0.0.1" || ip == "dns_error", "got: {ip}");
}

#[test]
fn test_reload_after_override_change() {
    let tb = TestBase::new();
    let manager = tb.initialized_manager();
    let artifact = tb.build_artifact("plugin1", "\n[custom]\nfoo = original\n");
    manager.install_plugin(&artifact, None).unwrap().unwrap();

    let mut plugin = manager.get_plugin("plugin1").unwrap();
    {
        let doc = plugin.configuration().unwrap().document().unwrap();
        assert_eq!(doc.get("custom", "foo").unwrap().as_str(), Some("original"));
    }

    let override_path = tb.module_env.runtime_override_path("plugin1");
    fs::create_dir_all(override_path.parent().unwrap()).unwrap();
    fs::write(&override_path, "[custom]\nfoo = changed\n").unwrap();

    // unchanged until an explicit reload
    {
        let doc = plugin.configuration().unwrap().document().unwrap();
        assert_eq!(doc.get("custom", "foo").unwrap().as_str(), Some("original"));
    }
    plugin.reload().unwrap();
    let doc = plugin.configuration().unwrap().document().unwrap();
    assert_eq!(doc.get("custom", "foo").unwrap().as_str(), Some("changed"));
}
