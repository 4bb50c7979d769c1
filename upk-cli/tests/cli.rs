use predicates::prelude::*;
use serde_json::Value;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use upk_codec::Codec;
use upk_test_utils::PackageBuilder;

struct SampleFile {
    _dir: TempDir,
    path: PathBuf,
}

fn sample_builder() -> PackageBuilder {
    let mut b = PackageBuilder::modern(868);
    let mesh = b.import("Engine", "Class", "StaticMesh");
    let package = b.import("Core", "Class", "Package");
    let group = b.modern_props().finish();
    let rock = b
        .modern_props()
        .int("LODs", 3)
        .str("Source", "rock.fbx")
        .int_struct_array("Sections", &[4, 8])
        .finish();
    let outer = b.export("Props", package, 0, group);
    b.export("Rock", mesh, outer, rock);
    b
}

fn write_sample(bytes: &[u8]) -> Result<SampleFile, Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Sample.upk");
    fs::write(&path, bytes)?;
    Ok(SampleFile { _dir: dir, path })
}

fn upk() -> Result<assert_cmd::Command, Box<dyn Error>> {
    Ok(assert_cmd::Command::cargo_bin("upk")?)
}

#[test]
fn ls_table_lists_qualified_names() -> Result<(), Box<dyn Error>> {
    let sample = write_sample(&sample_builder().build())?;
    upk()?
        .args(["ls", sample.path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Props.Package"))
        .stdout(predicate::str::contains("Props\\Rock.StaticMesh"));
    Ok(())
}

#[test]
fn ls_json_output_parses() -> Result<(), Box<dyn Error>> {
    let sample = write_sample(&sample_builder().build())?;
    let output = upk()?
        .args(["ls", sample.path.to_str().unwrap(), "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output)?;
    let objects = value[0]["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[1]["name"], "Props\\Rock.StaticMesh");
    assert_eq!(objects[1]["properties"], 3);
    Ok(())
}

#[test]
fn ls_reports_failing_package() -> Result<(), Box<dyn Error>> {
    let good = write_sample(&sample_builder().build())?;
    let bad = write_sample(b"definitely not a package")?;
    upk()?
        .args([
            "ls",
            good.path.to_str().unwrap(),
            bad.path.to_str().unwrap(),
            "--threads",
            "2",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Props\\Rock.StaticMesh"))
        .stderr(predicate::str::contains("Invalid magic"));
    Ok(())
}

#[test]
fn info_json_reports_layout_and_counts() -> Result<(), Box<dyn Error>> {
    let sample = write_sample(&sample_builder().build())?;
    let output = upk()?
        .args(["info", sample.path.to_str().unwrap(), "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output)?;
    assert_eq!(value["layout"], "modern");
    assert_eq!(value["version"], 868);
    assert_eq!(value["exports"], 2);
    assert_eq!(value["imports"], 2);
    Ok(())
}

#[test]
fn props_table_prints_values() -> Result<(), Box<dyn Error>> {
    let sample = write_sample(&sample_builder().build())?;
    upk()?
        .args(["props", sample.path.to_str().unwrap(), "Props\\Rock.StaticMesh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("LODs\tInt\t3"))
        .stdout(predicate::str::contains("Source\tStr\t\"rock.fbx\""))
        .stdout(predicate::str::contains("Sections\tArray"));
    Ok(())
}

#[test]
fn props_json_output_parses() -> Result<(), Box<dyn Error>> {
    let sample = write_sample(&sample_builder().build())?;
    let output = upk()?
        .args([
            "props",
            sample.path.to_str().unwrap(),
            "Props\\Rock",
            "--format",
            "json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output)?;
    assert_eq!(value["type_name"], "StaticMesh");
    let sections = &value["properties"][2]["value"];
    assert_eq!(sections["kind"], "Array");
    assert_eq!(sections["value"][1]["value"]["type_name"], "IntProperty");
    Ok(())
}

#[test]
fn props_unknown_object_fails() -> Result<(), Box<dyn Error>> {
    let sample = write_sample(&sample_builder().build())?;
    upk()?
        .args(["props", sample.path.to_str().unwrap(), "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn decompress_writes_cache_file() -> Result<(), Box<dyn Error>> {
    let archive = sample_builder().build_compressed(Codec::Deflate, 2);
    let sample = write_sample(&archive.compressed)?;
    let mut expected = sample.path.clone().into_os_string();
    expected.push(".decompressed");

    upk()?
        .args(["decompress", sample.path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains(".decompressed"));
    assert_eq!(fs::read(PathBuf::from(expected))?, archive.expanded);
    Ok(())
}

#[test]
fn decompress_to_explicit_output() -> Result<(), Box<dyn Error>> {
    let archive = sample_builder().build_compressed(Codec::Lzo, 1);
    let sample = write_sample(&archive.compressed)?;
    let output = sample._dir.path().join("Expanded.upk");

    upk()?
        .args([
            "decompress",
            sample.path.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();
    assert_eq!(fs::read(&output)?, archive.expanded);
    Ok(())
}

#[test]
fn no_cache_leaves_no_cache_file() -> Result<(), Box<dyn Error>> {
    let archive = sample_builder().build_compressed(Codec::Deflate, 1);
    let sample = write_sample(&archive.compressed)?;
    upk()?
        .args(["--no-cache", "ls", sample.path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Props\\Rock.StaticMesh"));
    let entries = fs::read_dir(sample._dir.path())?.count();
    assert_eq!(entries, 1);
    Ok(())
}

#[test]
fn verbose_flag_logs_to_stderr() -> Result<(), Box<dyn Error>> {
    let archive = sample_builder().build_compressed(Codec::Deflate, 1);
    let sample = write_sample(&archive.compressed)?;
    upk()?
        .args(["-v", "ls", sample.path.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("decompressed package"));
    Ok(())
}
