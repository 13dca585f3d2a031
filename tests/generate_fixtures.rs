mod common;

use common::{ids, TinyModel, END_ID, LONG_PROMPT, PAD_ID, SHORT_PROMPT};
use expected_output::fixtures::{self, FixturePaths};
use expected_output::{generate, generate_all, Error, WorldConfig, FIXTURE_RUNS};
use ndarray::{Array2, Axis};

#[test]
fn writes_two_files_per_run() {
    let model = TinyModel::build(true);
    let args = model.args(&[]);

    let written = generate_all(&args, WorldConfig::single()).unwrap();
    assert_eq!(written.len(), FIXTURE_RUNS.len());

    for (&(bs, bm), paths) in FIXTURE_RUNS.iter().zip(&written) {
        assert_eq!(*paths, FixturePaths::new(model.data_dir(), bs, bm));
        assert!(paths.input_ids.exists());
        assert!(paths.output_ids.exists());

        let (input, output) = fixtures::load(paths).unwrap();
        assert_eq!(input.nrows(), bs);
        assert_eq!(output.shape()[0], bs);
        assert_eq!(output.shape()[1], bm);
        assert!(output.shape()[2] <= input.ncols() + 6);
    }

    let files = std::fs::read_dir(model.data_dir()).unwrap().count();
    assert_eq!(files, 2 * FIXTURE_RUNS.len());
}

#[test]
fn outputs_start_with_the_prompt() {
    let model = TinyModel::build(true);
    let args = model.args(&[]);

    let paths = generate(&args, 2, 1, WorldConfig::single()).unwrap();
    let (_, output) = fixtures::load(&paths).unwrap();

    for (b, prompt) in [SHORT_PROMPT, LONG_PROMPT].iter().enumerate() {
        let prompt = ids(prompt);
        let row: Vec<i32> = output.index_axis(Axis(0), b).row(0).to_vec();
        assert_eq!(&row[..prompt.len()], prompt.as_slice());
    }
}

#[test]
fn attention_plugin_aligns_inputs_at_the_head() {
    let model = TinyModel::build(true);
    let paths = generate(&model.args(&[]), 2, 1, WorldConfig::single()).unwrap();
    let (input, _) = fixtures::load(&paths).unwrap();

    let short = ids(SHORT_PROMPT);
    let width = ids(LONG_PROMPT).len();
    assert_eq!(input.ncols(), width);

    let row = input.row(0).to_vec();
    assert_eq!(&row[..short.len()], short.as_slice());
    assert!(row[short.len()..].iter().all(|&t| t == END_ID as i32));
}

#[test]
fn without_plugin_inputs_stay_left_padded() {
    let model = TinyModel::build(false);
    let paths = generate(&model.args(&[]), 2, 1, WorldConfig::single()).unwrap();
    let (input, output) = fixtures::load(&paths).unwrap();

    let short = ids(SHORT_PROMPT);
    let pad = input.ncols() - short.len();
    let row = input.row(0).to_vec();
    assert!(row[..pad].iter().all(|&t| t == PAD_ID as i32));
    assert_eq!(&row[pad..], short.as_slice());

    // The session strips the padding before decoding
    let out_row = output.index_axis(Axis(0), 0).row(0).to_vec();
    assert_eq!(&out_row[..short.len()], short.as_slice());
}

#[test]
fn rerun_is_byte_identical() {
    let model = TinyModel::build(true);
    let args = model.args(&[]);

    let first = generate_all(&args, WorldConfig::single()).unwrap();
    let snapshot: Vec<(Vec<u8>, Vec<u8>)> = first
        .iter()
        .map(|p| {
            (
                std::fs::read(&p.input_ids).unwrap(),
                std::fs::read(&p.output_ids).unwrap(),
            )
        })
        .collect();

    let second = generate_all(&args, WorldConfig::single()).unwrap();
    for (paths, (input, output)) in second.iter().zip(&snapshot) {
        assert_eq!(&std::fs::read(&paths.input_ids).unwrap(), input);
        assert_eq!(&std::fs::read(&paths.output_ids).unwrap(), output);
    }
}

#[test]
fn world_size_mismatch_fails_before_writing() {
    let model = TinyModel::build(true);
    let args = model.args(&[]);

    let err = generate(&args, 1, 1, WorldConfig { size: 2, rank: 0 }).unwrap_err();
    assert!(matches!(err, Error::WorldSizeMismatch { engine: 1, runtime: 2 }));
    assert!(!model.data_dir().exists());
}

#[test]
fn model_name_mismatch_fails() {
    let model = TinyModel::build(true);
    model.write_config("gpt2", 1, true);

    let err = generate(&model.args(&[]), 1, 1, WorldConfig::single()).unwrap_err();
    assert!(matches!(err, Error::ModelNameMismatch { .. }));
    assert!(!model.data_dir().exists());
}

#[test]
fn verify_detects_changed_fixtures() {
    let model = TinyModel::build(true);
    generate_all(&model.args(&[]), WorldConfig::single()).unwrap();

    let verify = model.args(&["--verify"]);
    generate_all(&verify, WorldConfig::single()).unwrap();

    // Corrupt one fixture
    let paths = FixturePaths::new(model.data_dir(), 1, 1);
    let bogus = Array2::<i32>::zeros((1, 3));
    ndarray_npy::write_npy(&paths.input_ids, &bogus).unwrap();

    let err = generate(&verify, 1, 1, WorldConfig::single()).unwrap_err();
    assert!(matches!(err, Error::FixtureMismatch(_)));
}

#[test]
fn missing_engine_is_reported() {
    let model = TinyModel::build(true);
    let engine = model.engine_dir().join("chatglm-6b_float32_tp1_rank0.engine");
    std::fs::remove_file(engine).unwrap();

    let err = generate(&model.args(&[]), 1, 1, WorldConfig::single()).unwrap_err();
    assert!(matches!(err, Error::EngineNotFound(_)));
}
