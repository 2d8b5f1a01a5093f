//! Archive → source tree → archive through the public API.

mod util;

use anyhow::Result;
use assert_fs::prelude::*;
use predicates::prelude::*;

use appsource::archive::{ArchiveStore, MemoryArchive};
use appsource::checksum::ChecksumEngine;
use appsource::{Config, pack, unpack};

#[test]
fn unpack_then_pack_keeps_the_checksum() -> Result<()> {
    let tmp = assert_fs::TempDir::new()?;
    let archive = util::write_sample_archive(tmp.path());
    let src = tmp.child("src");
    let out = tmp.child("Repacked.msapp");
    let config = Config::default();

    let unpacked = unpack(&archive, src.path(), &config, false)?;
    assert!(unpacked.warnings.is_empty(), "{:?}", unpacked.warnings);

    let packed = pack(src.path(), out.path(), &config)?;
    assert!(packed.warnings.is_empty(), "{:?}", packed.warnings);
    assert_eq!(packed.checksum.render(), unpacked.checksum.render());

    // The zip on disk hashes the same as the one we started from.
    let engine = ChecksumEngine::default();
    let before = engine.archive_checksum(MemoryArchive::read_zip(&archive)?.to_pairs())?;
    let after = engine.archive_checksum(MemoryArchive::read_zip(out.path())?.to_pairs())?;
    assert_eq!(before.per_entry(), after.per_entry());
    Ok(())
}

#[test]
fn source_tree_shape() -> Result<()> {
    let tmp = assert_fs::TempDir::new()?;
    let archive = util::write_sample_archive(tmp.path());
    let src = tmp.child("src");
    unpack(&archive, src.path(), &Config::default(), false)?;

    src.child("CanvasManifest.json")
        .assert(predicate::str::contains("\"ScreenOrder\""));
    src.child("Src/Screen1.fx.yaml").assert(
        predicate::str::contains("    HeaderBar1 As HeaderBar:")
            .and(predicate::str::contains("    Group1 As group:\n        Label1 As label:"))
            .and(predicate::str::contains("RGBA(56, 96, 178, 1)").not()),
    );
    src.child("Src/Components/HeaderBar.fx.yaml")
        .assert(predicate::str::starts_with("HeaderBar As HeaderBar:\n    Height: =40\n"));
    src.child("Src/EditorState/Screen1.editorstate.json")
        .assert(predicate::str::contains("\"ParentIndex\"").and(predicate::str::contains("GroupedControlsKey").not()));
    src.child("Entropy/Entropy.json")
        .assert(predicate::str::contains(util::COMPONENT_ID));
    src.child("Other/Assets/Images/logo.png")
        .assert(predicate::path::is_file());
    src.child("checksum.json")
        .assert(predicate::str::contains("\"ClientStampedChecksum\": \"C8_"));
    Ok(())
}

#[test]
fn edited_source_packs_with_warnings_only() -> Result<()> {
    let tmp = assert_fs::TempDir::new()?;
    let archive = util::write_sample_archive(tmp.path());
    let src = tmp.child("src");
    let config = Config::default();
    unpack(&archive, src.path(), &config, false)?;

    let screen = src.child("Src/Screen1.fx.yaml");
    let text = std::fs::read_to_string(screen.path())?;
    screen.write_str(&text.replace("Navigate(Screen1)", "Back()"))?;

    let out = tmp.child("Edited.msapp");
    let report = pack(src.path(), out.path(), &config)?;
    let touched: Vec<_> = report
        .warnings
        .iter()
        .filter_map(|w| w.entry.as_deref())
        .collect();
    assert_eq!(touched, vec!["Controls/4.json"]);

    let repacked = MemoryArchive::read_zip(out.path())?;
    let controls = repacked
        .get_entry("Controls/4.json")
        .map(|e| String::from_utf8_lossy(&e.bytes).into_owned())
        .unwrap_or_default();
    assert!(controls.contains("Back()"));
    Ok(())
}

#[test]
fn broken_source_reports_file_and_line() -> Result<()> {
    let tmp = assert_fs::TempDir::new()?;
    let archive = util::write_sample_archive(tmp.path());
    let src = tmp.child("src");
    unpack(&archive, src.path(), &Config::default(), false)?;

    src.child("Src/Screen1.fx.yaml")
        .write_str("Screen1 As screen:\n\tFill: =White\n")?;
    let err = pack(src.path(), tmp.child("x.msapp").path(), &Config::default()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Src/Screen1.fx.yaml"), "{msg}");
    assert!(msg.contains('2'), "{msg}");
    tmp.child("x.msapp").assert(predicate::path::missing());
    Ok(())
}

#[test]
fn unpack_refuses_to_clobber_unrelated_files() -> Result<()> {
    let tmp = assert_fs::TempDir::new()?;
    let archive = util::write_sample_archive(tmp.path());
    let src = tmp.child("src");
    src.child("notes.txt").write_str("keep me")?;

    assert!(unpack(&archive, src.path(), &Config::default(), true).is_err());
    src.child("notes.txt").assert("keep me");

    // A previous source tree is replaced when asked.
    let other = tmp.child("other");
    unpack(&archive, other.path(), &Config::default(), false)?;
    assert!(unpack(&archive, other.path(), &Config::default(), false).is_err());
    unpack(&archive, other.path(), &Config::default(), true)?;
    Ok(())
}

#[test]
fn failed_overwrite_leaves_the_existing_tree() -> Result<()> {
    let tmp = assert_fs::TempDir::new()?;
    let archive = util::write_sample_archive(tmp.path());
    let src = tmp.child("src");
    unpack(&archive, src.path(), &Config::default(), false)?;
    let screen = std::fs::read_to_string(src.child("Src/Screen1.fx.yaml").path())?;

    let mut broken = util::sample_archive();
    broken.take_entry("Properties.json");
    let bad = tmp.child("Bad.msapp");
    broken.write_zip(bad.path())?;

    assert!(unpack(bad.path(), src.path(), &Config::default(), true).is_err());
    src.child("CanvasManifest.json").assert(predicate::path::is_file());
    src.child("Src/Screen1.fx.yaml").assert(screen.as_str());
    Ok(())
}
