#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! End-to-end tests of the command layer against real archives

use pakfs_cli::{Command, Keychain, commands};
use pakfs_crypto::{AesKey, KeyGuid};
use pakfs_formats::pak::{CompressionMethod, PakBuilder};
use pakfs_vfs::{Vfs, VfsConfig};

const DLC_GUID: KeyGuid = KeyGuid::from_bytes([0x5A; 16]);

fn report(vfs: &Vfs, command: &Command) -> String {
    let mut out = Vec::new();
    commands::run(vfs, command, &mut out).expect("Command should succeed");
    String::from_utf8(out).expect("Report is UTF-8")
}

#[test]
fn test_keychain_unlocks_listed_archives() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let key = AesKey::new([0x6B; 32]);

    PakBuilder::new("../../../Game/")
        .add_file("base.txt", b"base".to_vec())
        .write_to(dir.path().join("pakchunk0.pak"))
        .expect("Failed to write archive");
    PakBuilder::new("../../../Game/DLC/")
        .with_compression(CompressionMethod::Lz4)
        .with_encryption(DLC_GUID, key)
        .add_file("extra.txt", b"extra content".to_vec())
        .write_to(dir.path().join("pakchunk1.pak"))
        .expect("Failed to write archive");

    let vfs = Vfs::new(VfsConfig::new(dir.path())).expect("Vfs should start");
    vfs.discover_configured();
    assert_eq!(vfs.mount_all(), 1);

    let listing = report(&vfs, &Command::Archives);
    let lines: Vec<_> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("unloaded"));
    assert!(lines[0].contains("pakchunk1.pak"));
    assert!(lines[1].starts_with("mounted"));
    assert!(lines[1].contains("Game/"));

    let needed = report(&vfs, &Command::Keys);
    assert!(needed.starts_with(&DLC_GUID.to_string()));
    assert!(needed.contains("pakchunk1.pak"));

    let keychain = Keychain::parse(&format!(
        r#"{{ "dynamicKeys": [{{ "guid": "{DLC_GUID}", "key": "{}" }}] }}"#,
        key.to_hex()
    ))
    .expect("Keychain should parse");
    assert_eq!(vfs.submit_keys(keychain.keys().expect("Keys decode")), 1);

    assert!(report(&vfs, &Command::Keys).is_empty());
    let extracted = report(
        &vfs,
        &Command::Extract {
            path: "Game/DLC/extra.txt".to_string(),
            output: None,
            offset: 6,
            length: None,
        },
    );
    assert_eq!(extracted, "content");
}

#[test]
fn test_missing_file_reported() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let vfs = Vfs::new(VfsConfig::new(dir.path())).expect("Vfs should start");
    vfs.discover_configured();

    let err = commands::run(
        &vfs,
        &Command::Info {
            path: "Game/missing.txt".to_string(),
        },
        &mut Vec::new(),
    )
    .expect_err("Missing file should fail");

    match err {
        pakfs_cli::CliError::Vfs(vfs_err) => assert!(vfs_err.is_not_found()),
        other => panic!("unexpected error: {other}"),
    }
}
