//! Mesh configuration rendering
//!
//! Rendering is pure string building. The same inputs always produce the same
//! bytes, which keeps the files on disk diffable between provisioning cycles.

use crate::bundle::{Artifact, ArtifactKind, ConfigBundle};
use crate::identity::{MeshIdentity, MeshPeer};
use vnode_core::EffectiveConfig;

/// Tunnel interface brought up by the post-up script
pub const TUNNEL_INTERFACE: &str = "tap0";

/// Prefix length assigned to the tunnel address
pub const TUNNEL_PREFIX_LEN: u8 = 24;

/// Render the configuration bundle for one identity
pub fn generate(
    config: &EffectiveConfig,
    identity: &MeshIdentity,
    peers: &[MeshPeer],
) -> ConfigBundle {
    ConfigBundle::new(
        Artifact::new(ArtifactKind::StartupDirectives, render_startup(config, identity, peers)),
        Artifact::new(ArtifactKind::DaemonConfig, render_daemon_config(config, identity)),
        Artifact::new(ArtifactKind::UpScript, render_up_script(identity)),
    )
}

fn scalar_settings<'a>(
    config: &'a EffectiveConfig,
    identity: &'a MeshIdentity,
) -> [(&'static str, &'a str); 6] {
    [
        ("AutoConnect", config.auto_connect.as_str()),
        ("ConnectTo", identity.peer_name.as_str()),
        ("Device", config.device.as_str()),
        ("DeviceType", config.device_type.as_str()),
        ("Mode", config.mode.as_str()),
        ("Name", identity.node_name.as_str()),
    ]
}

fn render_startup(config: &EffectiveConfig, identity: &MeshIdentity, peers: &[MeshPeer]) -> String {
    let mut lines: Vec<String> = scalar_settings(config, identity)
        .iter()
        .map(|(key, value)| format!("add {} = {}", key, value))
        .collect();

    lines.extend(host_block(&identity.node_name, &identity.address, identity));
    for peer in peers {
        lines.extend(host_block(&peer.name, &peer.address, identity));
    }

    join_lines(lines)
}

fn host_block(node: &str, address: &str, identity: &MeshIdentity) -> [String; 3] {
    [
        format!("add {}.Address = {}", node, address),
        format!("add {}.Subnet = {}", node, identity.subnet),
        format!("add {}.Port = {}", node, identity.port),
    ]
}

fn render_daemon_config(config: &EffectiveConfig, identity: &MeshIdentity) -> String {
    join_lines(
        scalar_settings(config, identity)
            .iter()
            .map(|(key, value)| format!("{} = {}", key, value)),
    )
}

fn render_up_script(identity: &MeshIdentity) -> String {
    join_lines([
        "#!/bin/bash".to_string(),
        format!("ip link set {} up", TUNNEL_INTERFACE),
        format!(
            "ip addr add {}/{} dev {}",
            identity.private_address, TUNNEL_PREFIX_LEN, TUNNEL_INTERFACE
        ),
    ])
}

fn join_lines(lines: impl IntoIterator<Item = String>) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{MeshRole, MeshTopology};
    use vnode_core::{resolve, NodeSettings, SettingsSource};

    fn config(connect: Option<&str>) -> EffectiveConfig {
        let source = SettingsSource::empty().with_node(
            "vk",
            NodeSettings {
                connect_to: connect.map(str::to_string),
                ..Default::default()
            },
        );
        resolve(&source, "vk").unwrap()
    }

    fn render(role: MeshRole, connect: Option<&str>) -> ConfigBundle {
        let config = config(connect);
        let topology = MeshTopology::default();
        let identity = MeshIdentity::resolve(role, &config, &topology);
        let peers = identity.peers(&config, &topology);
        generate(&config, &identity, &peers)
    }

    #[test]
    fn test_main_startup_golden() {
        let bundle = render(MeshRole::Main, None);
        let expected = "\
add AutoConnect = yes
add ConnectTo = nodepeer
add Device = /dev/net/tun
add DeviceType = tap
add Mode = switch
add Name = nodemain
add nodemain.Address = 172.17.0.2
add nodemain.Subnet = 10.1.1.0/24
add nodemain.Port = 655
add nodepeer.Address = 172.17.0.3
add nodepeer.Subnet = 10.1.1.0/24
add nodepeer.Port = 655
";
        assert_eq!(bundle.startup_directives().contents, expected);
    }

    #[test]
    fn test_daemon_config_golden() {
        let bundle = render(MeshRole::Main, None);
        let expected = "\
AutoConnect = yes
ConnectTo = nodepeer
Device = /dev/net/tun
DeviceType = tap
Mode = switch
Name = nodemain
";
        assert_eq!(bundle.daemon_config().contents, expected);
    }

    #[test]
    fn test_up_script_per_role() {
        let main = render(MeshRole::Main, None);
        assert_eq!(
            main.up_script().contents,
            "#!/bin/bash\nip link set tap0 up\nip addr add 10.1.1.1/24 dev tap0\n"
        );

        let peer = render(MeshRole::Peer, None);
        assert_eq!(
            peer.up_script().contents,
            "#!/bin/bash\nip link set tap0 up\nip addr add 10.1.1.2/24 dev tap0\n"
        );
    }

    #[test]
    fn test_peer_role_swaps_names() {
        let bundle = render(MeshRole::Peer, None);
        let daemon = &bundle.daemon_config().contents;
        assert!(daemon.contains("ConnectTo = nodemain\n"));
        assert!(daemon.contains("Name = nodepeer\n"));

        let startup = &bundle.startup_directives().contents;
        assert!(startup.contains("add nodepeer.Address = 172.17.0.3\n"));
        assert!(startup.contains("add nodemain.Address = 172.17.0.2\n"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let first = render(MeshRole::Main, Some("peerA peerB"));
        let second = render(MeshRole::Main, Some("peerA peerB"));
        assert_eq!(first, second);
        assert_eq!(
            first.startup_directives().contents.as_bytes(),
            second.startup_directives().contents.as_bytes()
        );
    }

    #[test]
    fn test_peer_triples_follow_local_triple_in_order() {
        let bundle = render(MeshRole::Main, Some("peerA peerB"));
        let lines: Vec<&str> = bundle.startup_directives().contents.lines().collect();

        assert_eq!(lines.len(), 6 + 3 * 3);
        assert_eq!(lines[6], "add nodemain.Address = 172.17.0.2");
        assert_eq!(lines[9], "add peerA.Address = 172.17.0.3");
        assert_eq!(lines[10], "add peerA.Subnet = 10.1.1.0/24");
        assert_eq!(lines[11], "add peerA.Port = 655");
        assert_eq!(lines[12], "add peerB.Address = 172.17.0.3");
        assert_eq!(lines[14], "add peerB.Port = 655");
    }

    #[test]
    fn test_empty_peer_list_omits_peer_block() {
        let config = config(None);
        let identity = MeshIdentity::resolve(MeshRole::Main, &config, &MeshTopology::default());
        let bundle = generate(&config, &identity, &[]);

        let startup = &bundle.startup_directives().contents;
        assert_eq!(startup.lines().count(), 9);
        assert!(!startup.contains("nodepeer.Address"));
    }

    #[test]
    fn test_custom_topology_port() {
        let config = config(None);
        let topology = MeshTopology {
            port: 10655,
            ..Default::default()
        };
        let identity = MeshIdentity::resolve(MeshRole::Main, &config, &topology);
        let bundle = generate(&config, &identity, &identity.peers(&config, &topology));
        assert!(bundle
            .startup_directives()
            .contents
            .contains("add nodemain.Port = 10655\n"));
    }
}
