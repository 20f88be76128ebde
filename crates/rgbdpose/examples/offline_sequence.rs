//! Run the pose pipeline over a recorded sequence and print one JSON record
//! per frame.
//!
//! ```text
//! cargo run --example offline_sequence -- <sequence_dir> <models_dir> <target>
//! ```
//!
//! `models_dir` must contain `segmenter.onnx`, `estimator.onnx`,
//! `refiner.onnx`, `classes.txt` and `<target>.xyz`.

use std::path::PathBuf;

use rgbdpose::{
    CameraSession, ModelPaths, ObjectCatalog, PipelineConfig, PosePipeline, SequenceSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!("usage: {} <sequence_dir> <models_dir> <target>", args[0]);
        std::process::exit(2);
    }
    let sequence = PathBuf::from(&args[1]);
    let models = PathBuf::from(&args[2]);
    let target = &args[3];

    let config = PipelineConfig {
        target: target.clone(),
        ..PipelineConfig::default()
    };
    let catalog = ObjectCatalog::from_classes_file(&models.join("classes.txt"))?;
    let paths = ModelPaths {
        segmenter: models.join("segmenter.onnx"),
        estimator: models.join("estimator.onnx"),
        refiner: models.join("refiner.onnx"),
        model_points: models.join(format!("{target}.xyz")),
    };
    let mut pipeline = PosePipeline::from_models(config, catalog, &paths)?;
    let mut session = CameraSession::open(Box::new(SequenceSource::open(&sequence)?))?;

    while let Some(frame) = session.next_frame()? {
        let output = pipeline.process(&frame)?;
        println!("{}", serde_json::to_string(&output.record)?);
    }
    Ok(())
}
