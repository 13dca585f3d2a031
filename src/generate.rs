//! Fixture generation driver
//!
//! One call of [`generate`] validates the engine, tokenizes the prompts,
//! decodes them and writes `inputId-BS{b}-BM{w}.npy` / `outputId-BS{b}-BM{w}.npy`.

use crate::args::Args;
use crate::fixtures::{trim_output, FixturePaths, FixtureWriter};
use crate::inputs::{align_to_head, prompts_for_batch};
use crate::model::{find_engines, EngineConfig};
use crate::runtime::{GenerationSession, Mapping, SamplingConfig, WorldConfig};
use crate::tensor::EngineBuffer;
use crate::tokenizer::ModelTokenizer;
use crate::{Error, Result};
use tracing::{debug, info};

/// Model the fixtures are generated for
pub const MODEL_NAME: &str = "chatglm-6b";

/// (batch size, beam width) runs, in execution order
pub const FIXTURE_RUNS: [(usize, usize); 3] = [(1, 1), (2, 1), (1, 2)];

/// Generate (or with `--verify`, check) the fixtures of one run
pub fn generate(
    args: &Args,
    batch_size: usize,
    beam_width: usize,
    world: WorldConfig,
) -> Result<FixturePaths> {
    info!(
        "generate expected {} output BatchSize={}, BeamWidth={}",
        args.model_name, batch_size, beam_width
    );

    let prompts = prompts_for_batch(&args.input_text, batch_size);
    if prompts.len() != batch_size {
        return Err(Error::Config("at least one --input-text is required".to_string()));
    }

    // Engine config must describe the model and world we run
    let config = EngineConfig::from_file(args.config_path())?;
    config.ensure_model_name(&args.model_name)?;
    config.ensure_world_size(world.size)?;

    let end_id = config.end_id();
    let pad_id = config.pad_id();
    let mapping = Mapping::new(world.size, world.rank, world.size)?;

    let engine_path = find_engines(
        &args.engine_dir,
        &config.builder_config.precision,
        world.size,
        world.rank,
    )?
    .into_iter()
    .next()
    .ok_or_else(|| Error::EngineNotFound(args.engine_dir.display().to_string()))?;

    // Tokenize
    let tokenizer = ModelTokenizer::from_dir(&args.tokenizer_dir)?;
    let mut batch = tokenizer.encode_batch(&prompts, pad_id)?;
    debug!("Input lengths: {:?}", batch.input_lengths);

    if config.uses_gpt_attention_plugin() {
        batch.input_ids = align_to_head(&batch.input_ids, token_i32(pad_id)?, token_i32(end_id)?);
    }

    let model_config = config.model_config(world.size)?;
    let sampling = SamplingConfig {
        num_beams: beam_width,
        temperature: args.temperature,
        top_k: args.top_k,
        top_p: args.top_p,
        length_penalty: args.length_penalty,
        repetition_penalty: args.repetition_penalty,
        random_seed: args.random_seed,
        ..SamplingConfig::new(end_id, pad_id)
    };

    let engine = EngineBuffer::open(&engine_path)?;
    info!("Loaded engine {} ({} bytes)", engine_path.display(), engine.len());
    let mut session = GenerationSession::new(model_config, engine.as_bytes(), mapping)?;
    drop(engine);

    session.setup(
        batch.batch_size(),
        batch.max_input_len(),
        args.max_output_len,
        beam_width,
    )?;
    // Returns once every sequence is finished
    let output_ids = session.decode(&batch.input_ids, &batch.input_lengths, &sampling)?;
    let output_ids = trim_output(&output_ids, token_i32(end_id)?);

    let writer = FixtureWriter::new(&args.data_dir);
    if args.verify {
        writer.verify(batch_size, beam_width, &batch.input_ids, &output_ids)
    } else {
        writer.save(batch_size, beam_width, &batch.input_ids, &output_ids)
    }
}

/// Run every entry of [`FIXTURE_RUNS`] in order, stopping at the first failure
pub fn generate_all(args: &Args, world: WorldConfig) -> Result<Vec<FixturePaths>> {
    FIXTURE_RUNS
        .iter()
        .map(|&(batch_size, beam_width)| generate(args, batch_size, beam_width, world))
        .collect()
}

fn token_i32(id: u32) -> Result<i32> {
    i32::try_from(id).map_err(|_| Error::Config(format!("token id {} overflows i32", id)))
}
