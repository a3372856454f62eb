// ==============================================================================
// processor.rs - Feature Pipeline Orchestration
// ==============================================================================
// Description: Runs the generic, organ-specific and prediction stages
// Author: Matt Barham
// Created: 2026-09-22
// Modified: 2026-10-12
// Version: 1.2.0
// ==============================================================================
// Stages:
//   1. Generic features: registry + annotations + generic signals + classes
//   2. Organ features: three count passes + organ signals (one table per organ)
//   3. Assemble + predict: organ table left-joined onto the generic matrix
// Organs are validated before any input is read; a batch run processes organs
// in parallel and shares only read-only inputs.
// ==============================================================================

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::assembler::assemble;
use crate::class_merge::merge_sequence_classes;
use crate::config::{GenericInputs, ModelInputs, OrganInputs, OutputLayout, PipelineConfig};
use crate::generic_features::{join_generic_features, GenericSignalDirs};
use crate::models::{FeatureMatrix, KeyedFeatureTable};
use crate::organ_features::OrganAggregator;
use crate::output;
use crate::parsers::{
    load_organ_list, AnnotationReader, AnnotationRecord, OrganTotals, SequenceClassTable,
    VariantParser,
};
use crate::predictor::{validate_organ, ModelRouting, ModelSet, PredictionTable, Predictor};
use crate::signal_track::{BigWigOpener, SignalTrackOpener};

/// Read the annotation stream once; every stage shares the records
pub fn read_annotations(path: &std::path::Path) -> Result<Vec<AnnotationRecord>> {
    let set = AnnotationReader::read(path)
        .with_context(|| format!("Failed to read annotations from {:?}", path))?;
    Ok(set.records)
}

/// Fail with `DispatchError::InvalidOrgan` for the first unknown organ
pub fn check_organs(organs: &[String], inputs: &ModelInputs) -> Result<()> {
    let organ_list = load_organ_list(&inputs.organ_list)
        .with_context(|| format!("Failed to read organ list {:?}", inputs.organ_list))?;
    for organ in organs {
        validate_organ(organ, &organ_list)?;
    }
    Ok(())
}

/// Routing table and both model artifacts
pub fn load_predictor(inputs: &ModelInputs) -> Result<Predictor> {
    let routing = match &inputs.data_rich_organs {
        Some(path) => ModelRouting::from_file(path)
            .with_context(|| format!("Failed to read data-rich organ list {:?}", path))?,
        None => ModelRouting::default(),
    };
    let models = ModelSet::load(&inputs.models_dir).context("Failed to load model artifacts")?;
    Ok(Predictor::new(routing, models))
}

/// Assemble one organ's matrix and score it
pub fn predict(
    organ: &str,
    generic: FeatureMatrix,
    organ_table: KeyedFeatureTable,
    predictor: &Predictor,
) -> Result<PredictionTable> {
    let matrix = assemble(generic, organ_table).context("Failed to assemble feature matrix")?;
    let predictions = predictor
        .predict(organ, &matrix)
        .with_context(|| format!("Prediction failed for organ '{}'", organ))?;
    Ok(predictions)
}

/// Drop repeated organs; fail when two names share output files
fn unique_organs<'a>(organs: &'a [String], layout: &OutputLayout) -> Result<Vec<&'a String>> {
    let mut seen: HashMap<PathBuf, &String> = HashMap::new();
    let mut unique = Vec::with_capacity(organs.len());

    for organ in organs {
        match seen.entry(layout.predictions(organ)) {
            Entry::Vacant(entry) => {
                entry.insert(organ);
                unique.push(organ);
            }
            Entry::Occupied(entry) if *entry.get() == organ => {
                warn!("Organ '{}' listed more than once; scoring it once", organ);
            }
            Entry::Occupied(entry) => bail!(
                "Organs '{}' and '{}' would write the same output {:?}",
                entry.get(),
                organ,
                entry.key()
            ),
        }
    }

    Ok(unique)
}

/// Feature stages over a signal-track backend
pub struct FeaturePipeline<O: SignalTrackOpener = BigWigOpener> {
    opener: O,
}

impl Default for FeaturePipeline<BigWigOpener> {
    fn default() -> Self {
        Self::new(BigWigOpener)
    }
}

impl<O: SignalTrackOpener> FeaturePipeline<O> {
    pub fn new(opener: O) -> Self {
        Self { opener }
    }

    /// Registry + generic annotations + generic signals + sequence classes
    pub fn generic_features(
        &self,
        records: &[AnnotationRecord],
        inputs: &GenericInputs,
    ) -> Result<FeatureMatrix> {
        info!("Building generic features");

        let variants = VariantParser::parse(&inputs.variants)
            .with_context(|| format!("Failed to parse variants {:?}", inputs.variants))?;
        info!("Variant registry: {} rows", variants.len());

        let signals = GenericSignalDirs {
            dnase_dir: inputs.dnase_dir.clone(),
            chip_dir: inputs.chip_dir.clone(),
        };
        let mut matrix = join_generic_features(variants, records, &signals, &self.opener)
            .context("Failed to join generic annotations")?;

        let classes = SequenceClassTable::parse(&inputs.sequence_classes).with_context(|| {
            format!("Failed to parse sequence classes {:?}", inputs.sequence_classes)
        })?;
        merge_sequence_classes(&mut matrix, &classes, inputs.all_null_policy)
            .context("Failed to merge sequence classes")?;

        info!(
            "Generic features complete: {} variants x {} columns",
            matrix.len(),
            matrix.columns.len()
        );
        Ok(matrix)
    }

    /// Organ-specific table for one organ
    pub fn organ_features(
        &self,
        organ: &str,
        records: &[AnnotationRecord],
        totals: &OrganTotals,
        inputs: &OrganInputs,
    ) -> Result<KeyedFeatureTable> {
        OrganAggregator::new(organ, totals)
            .with_join_kind(inputs.join_kind)
            .aggregate(records, &inputs.organ_dnase_dir, &self.opener)
            .with_context(|| format!("Failed to build organ features for '{}'", organ))
    }

    /// Whole pipeline for every organ; returns the predictions files
    pub fn run(
        &self,
        config: &PipelineConfig,
        organs: &[String],
        layout: &OutputLayout,
    ) -> Result<Vec<PathBuf>> {
        check_organs(organs, &config.models)?;
        let organs = unique_organs(organs, layout)?;
        info!("Running pipeline for {} organs into {:?}", organs.len(), layout.dir());

        std::fs::create_dir_all(layout.dir())
            .with_context(|| format!("Failed to create output directory {:?}", layout.dir()))?;

        let predictor = load_predictor(&config.models)?;
        let records = read_annotations(&config.annotations)?;

        let generic = self.generic_features(&records, &config.generic)?;
        output::write_feature_matrix(layout.features(), &generic)?;

        let totals = OrganTotals::load(&config.organ.totals_dir)
            .with_context(|| format!("Failed to load organ totals from {:?}", config.organ.totals_dir))?;

        let outputs = organs
            .into_par_iter()
            .map(|organ| -> Result<PathBuf> {
                let organ_table = self.organ_features(organ, &records, &totals, &config.organ)?;
                output::write_keyed_table(layout.organ_features(organ), &organ_table, Some(organ.as_str()))?;

                let predictions = predict(organ, generic.clone(), organ_table, &predictor)?;
                let path = layout.predictions(organ);
                output::write_predictions(&path, &predictions)?;
                Ok(path)
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Pipeline complete: {} predictions files", outputs.len());
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_merge::AllNullPolicy;
    use crate::join::JoinKind;
    use crate::models::FeatureFamily;
    use crate::predictor::DispatchError;
    use crate::signal_track::testing::{MemoryOpener, MemoryTrack};
    use flate2::read::MultiGzDecoder;
    use std::io::Read;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_inputs(dir: &Path) -> PipelineConfig {
        std::fs::write(
            dir.join("variants.tsv"),
            "#chrom\tpos\tid\tref\talt\n\
             chr1\t100\trs1\tA\tG\n\
             chr1\t200\trs2\tC\tT\n",
        )
        .unwrap();

        let features = r#"{"ChIP": true, "Chromatin_accessibility": true, "PWM": false, "Footprint": false, "QTL": false, "PWM_matched": false, "Footprint_matched": false, "IC_matched_max": 0, "IC_max": 0}"#;
        let peaks = r#"[{"method": "ChIP-seq", "targets": ["CTCF"], "organ_slims": ["liver"], "biosample_term_name": "HepG2"}]"#;
        std::fs::write(
            dir.join("annotations.jsonl"),
            format!(
                "{{\"chrom\": \"chr1\", \"end\": 100, \"features\": {}, \"peaks\": {}}}\n\n\
                 not json\n\
                 {{\"chrom\": \"chr1\", \"end\": 200, \"features\": {}, \"peaks\": []}}\n",
                features, peaks, features
            ),
        )
        .unwrap();

        std::fs::write(
            dir.join("classes.tsv"),
            "chrom\tpos\tid\tref\talt\tstrand\tseqclass_max_absdiff\tPC1\n\
             chr1\t100\trs1\tA\tG\t+\t0.4\t-0.4\n",
        )
        .unwrap();

        let totals_dir = dir.join("totals");
        std::fs::create_dir_all(&totals_dir).unwrap();
        for family in FeatureFamily::all() {
            std::fs::write(totals_dir.join(OrganTotals::file_name(family)), "liver\t4\n").unwrap();
        }

        std::fs::write(dir.join("organs.txt"), "liver\nthymus\n").unwrap();

        let models_dir = dir.join("models");
        std::fs::create_dir_all(&models_dir).unwrap();
        std::fs::write(
            models_dir.join("model_full.json"),
            r#"{"name": "TLand", "kind": "passthrough", "features": [{"name": "CTCF_organSp_perc"}]}"#,
        )
        .unwrap();
        std::fs::write(
            models_dir.join("model_lightest.json"),
            r#"{"name": "TLand_lightest", "kind": "ridge", "intercept": 0.0, "features": [{"name": "CHIP", "coefficient": 0.0}]}"#,
        )
        .unwrap();

        PipelineConfig {
            annotations: dir.join("annotations.jsonl"),
            generic: GenericInputs {
                variants: dir.join("variants.tsv"),
                sequence_classes: dir.join("classes.tsv"),
                dnase_dir: dir.join("dnase"),
                chip_dir: dir.join("chip"),
                all_null_policy: AllNullPolicy::Fail,
            },
            organ: OrganInputs {
                organ_dnase_dir: dir.join("organ_dnase"),
                totals_dir,
                join_kind: JoinKind::Inner,
            },
            models: ModelInputs {
                organ_list: dir.join("organs.txt"),
                models_dir,
                data_rich_organs: None,
            },
        }
    }

    fn opener() -> MemoryOpener {
        MemoryOpener::default()
            .with("DNase_var.bw", MemoryTrack::default().with("chr1", 99, 0.5))
            .with("DNase_var_liver.bw", MemoryTrack::default().with("chr1", 199, 1.25))
    }

    #[test]
    fn test_generic_features() {
        let dir = tempdir().unwrap();
        let config = write_inputs(dir.path());
        let pipeline = FeaturePipeline::new(opener());

        let records = read_annotations(&config.annotations).unwrap();
        let matrix = pipeline.generic_features(&records, &config.generic).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.column("DNase_var").unwrap().values, vec![Some(0.5), None]);
        // Second variant has no class row: imputed with the run mean
        assert_eq!(matrix.column("PC1").unwrap().values, vec![Some(-0.4), Some(-0.4)]);
        assert_eq!(matrix.column("max_abs_diff").unwrap().values, vec![Some(0.4), Some(0.4)]);
    }

    #[test]
    fn test_run_writes_predictions() {
        let dir = tempdir().unwrap();
        let config = write_inputs(dir.path());
        let layout = OutputLayout::new(dir.path().join("out"));
        let organs = vec!["liver".to_string(), "thymus".to_string()];

        let outputs = FeaturePipeline::new(opener()).run(&config, &organs, &layout).unwrap();

        assert_eq!(outputs, vec![layout.predictions("liver"), layout.predictions("thymus")]);
        assert!(layout.features().exists());

        let organ_table = output::read_keyed_table(layout.organ_features("liver")).unwrap();
        assert_eq!(organ_table.column("CTCF_organSp_perc").unwrap().values, vec![Some(0.25), Some(0.0)]);
        assert_eq!(organ_table.column("DNase_var_organSp").unwrap().values, vec![None, Some(1.25)]);

        let mut text = String::new();
        MultiGzDecoder::new(std::fs::File::open(layout.predictions("liver")).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(
            text,
            "chrom\tpos\tref\talt\tliver_TLand\nchr1\t100\tA\tG\t0.25\nchr1\t200\tC\tT\t0\n"
        );

        let mut text = String::new();
        MultiGzDecoder::new(std::fs::File::open(layout.predictions("thymus")).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.starts_with("chrom\tpos\tref\talt\tthymus_TLand_lightest\n"));
        assert!(text.contains("chr1\t100\tA\tG\t0.5\n"));
    }

    #[test]
    fn test_run_scores_repeated_organ_once() {
        let dir = tempdir().unwrap();
        let config = write_inputs(dir.path());
        let layout = OutputLayout::new(dir.path().join("out"));
        let organs = vec!["liver".to_string(), "liver".to_string()];

        let outputs = FeaturePipeline::new(opener()).run(&config, &organs, &layout).unwrap();

        assert_eq!(outputs, vec![layout.predictions("liver")]);
    }

    #[test]
    fn test_unique_organs_rejects_colliding_names() {
        let layout = OutputLayout::new("/out");
        let organs = vec!["bodily fluid".to_string(), "bodily_fluid".to_string()];

        let err = unique_organs(&organs, &layout).unwrap_err();

        assert!(err.to_string().contains("bodily_fluid"));
        assert!(err.to_string().contains("predictions_bodily_fluid.tsv.gz"));
    }

    #[test]
    fn test_run_rejects_unknown_organ_before_reading_inputs() {
        let dir = tempdir().unwrap();
        let mut config = write_inputs(dir.path());
        config.annotations = dir.path().join("missing.jsonl");
        let layout = OutputLayout::new(dir.path().join("out"));

        let err = FeaturePipeline::new(opener())
            .run(&config, &["liver".to_string(), "nonexistent_organ".to_string()], &layout)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::InvalidOrgan { organ, .. }) if organ == "nonexistent_organ"
        ));
        assert!(!layout.dir().exists());
    }
}
