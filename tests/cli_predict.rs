use assert_cmd::Command;
use flate2::read::MultiGzDecoder;
use predicates::prelude::*;
use regulome_scorer::models::{FeatureColumn, FeatureMatrix, KeyedFeatureTable, Variant, VariantKey};
use regulome_scorer::output::{write_feature_matrix, write_keyed_table};
use std::fs;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

fn write_fixtures(dir: &Path) -> anyhow::Result<()> {
    fs::write(dir.join("organs.txt"), "liver\nthymus\nbrain\n")?;

    let models = dir.join("models");
    fs::create_dir_all(&models)?;
    fs::write(
        models.join("model_full.json"),
        r#"{"name": "TLand", "kind": "passthrough", "features": [{"name": "CHIP_organSp_perc", "fill_value": 0.0}]}"#,
    )?;
    fs::write(
        models.join("model_lightest.json"),
        r#"{"name": "TLand_lightest", "kind": "logistic", "intercept": 0.0, "features": [{"name": "CHIP", "coefficient": 1.0}]}"#,
    )?;

    let variants = [(100, "rs1"), (200, "rs2")]
        .iter()
        .map(|(end, id)| Variant {
            chrom: "chr1".to_string(),
            end: *end,
            id: id.to_string(),
            ref_allele: "A".to_string(),
            alt_allele: "C".to_string(),
        })
        .collect();
    let mut generic = FeatureMatrix::new(variants);
    generic.push_column(FeatureColumn::integer("CHIP", vec![Some(0.0), Some(0.0)]));
    write_feature_matrix(dir.join("generic.parquet"), &generic)?;

    let mut organ = KeyedFeatureTable::new(vec![VariantKey::new("chr1", 100)]);
    organ.push_column(FeatureColumn::float("CHIP_organSp_perc", vec![Some(0.75)]));
    write_keyed_table(dir.join("organ.parquet"), &organ, Some("liver"))?;

    Ok(())
}

fn predict_cmd(dir: &Path, organ: &str, out: &Path) -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("regulome-scorer")?;
    cmd.arg("predict")
        .arg("--generic-features")
        .arg(dir.join("generic.parquet"))
        .arg("--organ-features")
        .arg(dir.join("organ.parquet"))
        .arg("--organ-list")
        .arg(dir.join("organs.txt"))
        .arg("--models-dir")
        .arg(dir.join("models"))
        .arg("--organ")
        .arg(organ)
        .arg("-o")
        .arg(out);
    Ok(cmd)
}

fn read_gz(path: &Path) -> anyhow::Result<String> {
    let mut text = String::new();
    MultiGzDecoder::new(fs::File::open(path)?).read_to_string(&mut text)?;
    Ok(text)
}

#[test]
fn test_predict_invalid_organ() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    fs::write(temp.path().join("organs.txt"), "liver\nbrain\n")?;
    let out = temp.path().join("out.tsv.gz");

    // Feature tables and models do not exist: validation must come first
    predict_cmd(temp.path(), "nonexistent_organ", &out)?
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nonexistent_organ"))
        .stderr(predicate::str::contains("liver"));

    assert!(!out.exists());
    Ok(())
}

#[test]
fn test_predict_data_rich_organ() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    write_fixtures(temp.path())?;
    let out = temp.path().join("liver.tsv.gz");

    predict_cmd(temp.path(), "liver", &out)?.assert().success();

    assert_eq!(
        read_gz(&out)?,
        "chrom\tpos\tref\talt\tliver_TLand\nchr1\t100\tA\tC\t0.75\nchr1\t200\tA\tC\t0\n"
    );
    Ok(())
}

#[test]
fn test_predict_all_uses_lightest_model() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    write_fixtures(temp.path())?;
    let out = temp.path().join("all.tsv.gz");

    predict_cmd(temp.path(), "all", &out)?.assert().success();

    let text = read_gz(&out)?;
    assert!(text.starts_with("chrom\tpos\tref\talt\tall_TLand_lightest\n"));
    assert!(text.contains("chr1\t100\tA\tC\t0.5\n"));
    Ok(())
}

#[test]
fn test_predict_data_rich_override() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    write_fixtures(temp.path())?;
    fs::write(temp.path().join("rich.txt"), "thymus\n")?;
    let out = temp.path().join("thymus.tsv.gz");

    predict_cmd(temp.path(), "thymus", &out)?
        .arg("--data-rich-organs")
        .arg(temp.path().join("rich.txt"))
        .assert()
        .success();

    assert!(read_gz(&out)?.starts_with("chrom\tpos\tref\talt\tthymus_TLand\n"));
    Ok(())
}

#[test]
fn test_predict_missing_arguments() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("regulome-scorer")?;
    cmd.arg("predict")
        .env_remove("REGULOME_ORGAN_LIST")
        .env_remove("REGULOME_MODELS_DIR")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--organ"));
    Ok(())
}
