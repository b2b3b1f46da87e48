//! Run scripts of the `binica` driver
//!
//! A script is a whitespace separated list of `keyword value` pairs. A token starting with
//! `#`, `!` or `%` comments out the rest of its line. Keywords are case-insensitive:
//!
//! | keyword | value |
//! |---|---|
//! | `datafile` | input data, `f32` matrix `(chans, frames * epochs)` |
//! | `chans`, `chan` | number of channels |
//! | `frames`, `datalength` | number of frames per epoch |
//! | `epochs`, `epoch` | number of epochs, default 1 |
//! | `weightsoutfile` | output weights `(ncomps, chans)` |
//! | `spherefile` | output sphering matrix `(chans, chans)` |
//! | `weightsinfile` | starting weights `(ncomps, ncomps)` |
//! | `activationsfile`, `biasfile`, `signfile` | optional outputs |
//! | `pca` | number of principal components to retain, 0 keeps all channels |
//! | `sphering`, `sphereing`, `sphere` | `on`, `off` or `none` |
//! | `extended`, `extend` | kurtosis estimate every N blocks, N < 0 fixes -N sub-Gaussians |
//! | `lrate`, `block`/`blocksize`, `stop`/`nochange`/`stopping`, `maxsteps`/`steps` | training |
//! | `anneal`/`annealstep`, `annealdeg`/`degrees`, `momentum` | annealing and momentum |
//! | `bias`, `posact`, `verbose` | `on`/`off` flags |
//! | `seed` | seed of the random number generator |
//! | `layout` | `channel` (default) or `multiplexed` order of all matrix files |
//! | `partitions`, `mergeinterval` | partitioned training |
//!
//! `datafile`, `chans`, `frames`, `weightsoutfile` and `spherefile` are required.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{IcaError, Result};
use crate::hyperparams::InfomaxParams;
use crate::io::{element_count, Layout};
use crate::preprocessing::Sphering;
use crate::strategy::Execution;
use crate::trainer::Extended;
use crate::ParamGuard;

const COMMENT_CHARS: &[char] = &['#', '!', '%'];
/// Steps between two merges if only `partitions` is given
pub const DEFAULT_MERGE_INTERVAL: usize = 4;

/// Sample script printed by `binica --template`
pub const TEMPLATE: &str = "\
# binica run script, keywords are case-insensitive

# Required
    DataFile       data.fdt     # input data, native f32, channel after channel
    chans          31           # number of channels (data rows)
    frames         768          # frames per epoch (data columns)
    epochs         436          # number of epochs {default: 1}
    WeightsOutFile data.wts     # output ICA weights (ncomps, chans)
    SphereFile     data.sph     # output sphering matrix (chans, chans)

# Processing
#   sphering       on           # on, off or none {default: on}
#   bias           on           # online bias adjustment {default: on}
    extended       1            # extended ICA with a kurtosis estimate every N blocks,
                                #   N < 0 fixes -N sub-Gaussian components {default: 0}
#   pca            0            # retain this many principal components {default: all}

# Training
#   WeightsInFile  start.wts    # starting weights (ncomps, ncomps)
    lrate          2.0e-3       # initial learning rate {default: 0.015 / ln(chans)}
#   blocksize      20           # frames per block {default: ceil(min(5 ln(frames), 0.3 frames))}
#   stop           1.0e-6       # stop when the weight change falls below {default: 1e-6}
    maxsteps       512          # maximum number of training steps {default: 512}
#   annealstep     0.98         # learning rate factor, in (0, 1] {default: 0.90, extended 0.98}
#   annealdeg      60           # angle threshold for annealing, degrees {default: 60}
#   momentum       0.0          # momentum gain, in [0, 1] {default: 0}
#   seed           42           # random seed {default: from entropy}
#   partitions     4            # train on this many frame windows in parallel {default: 1}
#   mergeinterval  4            # steps between merges of the windows {default: 4}
#   posact         on           # make each component activation net-positive {default: on}
#   layout         channel      # channel or multiplexed order of matrix files {default: channel}
#   verbose        on           # log progress {default: off}

# Optional outputs
#   ActivationsFile data.act    # component activations (ncomps, frames)
#   BiasFile       data.bs      # bias (ncomps, 1)
#   SignFile       data.sgn     # -1 for sub- and 1 for super-Gaussian components
";

/// Split a script into tokens, dropping comments
pub fn tokenize(script: &str) -> Vec<&str> {
    script
        .lines()
        .flat_map(|line| {
            line.split_whitespace()
                .take_while(|token| !token.starts_with(COMMENT_CHARS))
        })
        .collect()
}

/// Everything a `binica` run needs
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub data_file: PathBuf,
    pub weights_in: Option<PathBuf>,
    pub weights_out: PathBuf,
    pub sphere_file: PathBuf,
    pub activations_file: Option<PathBuf>,
    pub bias_file: Option<PathBuf>,
    pub sign_file: Option<PathBuf>,
    pub channels: usize,
    pub frames: usize,
    pub epochs: usize,
    pub layout: Layout,
    pub verbose: bool,
    pub params: InfomaxParams<f64>,
}

impl RunConfig {
    /// Number of frames over all epochs
    pub fn datalength(&self) -> Result<usize> {
        self.frames.checked_mul(self.epochs).ok_or_else(|| {
            IcaError::Config(format!(
                "{} frames x {} epochs overflow the data length",
                self.frames, self.epochs
            ))
        })
    }

    /// Parse a run script and validate the hyperparameters
    ///
    /// The first occurrence of a keyword wins, later duplicates are ignored with a warning.
    pub fn from_script(script: &str) -> Result<Self> {
        if !script.is_ascii() {
            return Err(IcaError::Config(
                "the script must be ascii text, not a binary file".into(),
            ));
        }

        let tokens = tokenize(script);
        if tokens.len() % 2 != 0 {
            return Err(IcaError::Config(format!(
                "odd number of tokens ({}), every keyword needs a value",
                tokens.len()
            )));
        }

        let mut builder = Builder::default();
        let mut seen = Vec::new();
        for pair in tokens.chunks_exact(2) {
            let keyword = canonical(&pair[0].to_ascii_lowercase())?;
            if seen.contains(&keyword) {
                log::warn!("ignoring repeated keyword `{}`", pair[0]);
                continue;
            }
            seen.push(keyword);
            builder.set(keyword, pair[1])?;
        }

        builder.finish()
    }
}

impl FromStr for RunConfig {
    type Err = IcaError;

    fn from_str(s: &str) -> Result<Self> {
        RunConfig::from_script(s)
    }
}

// Map aliases onto a single name
fn canonical(keyword: &str) -> Result<&'static str> {
    let name = match keyword {
        "datafile" => "datafile",
        "weightsinfile" => "weightsinfile",
        "weightsoutfile" => "weightsoutfile",
        "spherefile" => "spherefile",
        "activationsfile" => "activationsfile",
        "biasfile" => "biasfile",
        "signfile" => "signfile",
        "chans" | "chan" => "chans",
        "frames" | "datalength" => "frames",
        "epochs" | "epoch" => "epochs",
        "pca" => "pca",
        "lrate" => "lrate",
        "block" | "blocksize" => "block",
        "stop" | "nochange" | "stopping" => "stop",
        "maxsteps" | "steps" => "maxsteps",
        "anneal" | "annealstep" => "anneal",
        "annealdeg" | "degrees" => "annealdeg",
        "momentum" => "momentum",
        "sphering" | "sphereing" | "sphere" => "sphering",
        "bias" => "bias",
        "extended" | "extend" => "extended",
        "posact" => "posact",
        "verbose" => "verbose",
        "seed" => "seed",
        "layout" => "layout",
        "partitions" => "partitions",
        "mergeinterval" => "mergeinterval",
        other => return Err(IcaError::Config(format!("unknown keyword `{}`", other))),
    };
    Ok(name)
}

fn number<T: FromStr>(keyword: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        IcaError::Config(format!(
            "`{}` is not a valid value for {}",
            value, keyword
        ))
    })
}

fn flag(keyword: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        other => other
            .parse::<i64>()
            .map(|v| v > 0)
            .map_err(|_| IcaError::Config(format!("{} must be on or off, got `{}`", keyword, value))),
    }
}

#[derive(Default)]
struct Builder {
    data_file: Option<PathBuf>,
    weights_in: Option<PathBuf>,
    weights_out: Option<PathBuf>,
    sphere_file: Option<PathBuf>,
    activations_file: Option<PathBuf>,
    bias_file: Option<PathBuf>,
    sign_file: Option<PathBuf>,
    channels: Option<usize>,
    frames: Option<usize>,
    epochs: Option<usize>,
    layout: Option<Layout>,
    verbose: bool,
    ncomponents: Option<usize>,
    lrate: Option<f64>,
    block_size: Option<usize>,
    stop: Option<f64>,
    max_steps: Option<usize>,
    anneal_step: Option<f64>,
    anneal_deg: Option<f64>,
    momentum: Option<f64>,
    sphering: Option<Sphering>,
    bias: Option<bool>,
    extended: Option<Extended>,
    posact: Option<bool>,
    seed: Option<u64>,
    partitions: Option<usize>,
    merge_interval: Option<usize>,
}

impl Builder {
    fn set(&mut self, keyword: &'static str, value: &str) -> Result<()> {
        match keyword {
            "datafile" => self.data_file = Some(value.into()),
            "weightsinfile" => self.weights_in = Some(value.into()),
            "weightsoutfile" => self.weights_out = Some(value.into()),
            "spherefile" => self.sphere_file = Some(value.into()),
            "activationsfile" => self.activations_file = Some(value.into()),
            "biasfile" => self.bias_file = Some(value.into()),
            "signfile" => self.sign_file = Some(value.into()),
            "chans" => self.channels = Some(number(keyword, value)?),
            "frames" => self.frames = Some(number(keyword, value)?),
            "epochs" => self.epochs = Some(number(keyword, value)?),
            "pca" => {
                let n: usize = number(keyword, value)?;
                self.ncomponents = if n == 0 { None } else { Some(n) };
            }
            "lrate" => self.lrate = Some(number(keyword, value)?),
            "block" => {
                let n: usize = number(keyword, value)?;
                self.block_size = if n == 0 { None } else { Some(n) };
            }
            "stop" => self.stop = Some(number(keyword, value)?),
            "maxsteps" => self.max_steps = Some(number(keyword, value)?),
            "anneal" => self.anneal_step = Some(number(keyword, value)?),
            "annealdeg" => self.anneal_deg = Some(number(keyword, value)?),
            "momentum" => self.momentum = Some(number(keyword, value)?),
            "sphering" => self.sphering = Some(value.parse()?),
            "bias" => self.bias = Some(flag(keyword, value)?),
            "extended" => self.extended = Some(Extended::from_blocks(number(keyword, value)?)),
            "posact" => self.posact = Some(flag(keyword, value)?),
            "verbose" => self.verbose = flag(keyword, value)?,
            "seed" => self.seed = Some(number(keyword, value)?),
            "layout" => self.layout = Some(value.parse()?),
            "partitions" => self.partitions = Some(number(keyword, value)?),
            "mergeinterval" => self.merge_interval = Some(number(keyword, value)?),
            _ => unreachable!("keywords are canonicalized before"),
        }
        Ok(())
    }

    fn finish(self) -> Result<RunConfig> {
        let required = |v: Option<PathBuf>, name: &str| {
            v.ok_or_else(|| IcaError::Config(format!("{} is required", name)))
        };
        let data_file = required(self.data_file, "datafile")?;
        let weights_out = required(self.weights_out, "weightsoutfile")?;
        let sphere_file = required(self.sphere_file, "spherefile")?;

        let channels = self
            .channels
            .ok_or_else(|| IcaError::Config("chans is required".into()))?;
        if channels < 2 {
            return Err(IcaError::Config(
                "chans must be the number of input channels, at least 2".into(),
            ));
        }
        let frames = self
            .frames
            .ok_or_else(|| IcaError::Config("frames is required".into()))?;
        if frames < 2 {
            return Err(IcaError::Config(
                "frames must be the number of data points, at least 2".into(),
            ));
        }
        let epochs = self.epochs.unwrap_or(1);
        if epochs < 1 {
            return Err(IcaError::Config("epochs must be at least 1".into()));
        }

        let mut params = InfomaxParams::new();
        if let Some(n) = self.ncomponents {
            params = params.ncomponents(n);
        }
        if let Some(lrate) = self.lrate {
            params = params.lrate(lrate);
        }
        if let Some(block) = self.block_size {
            params = params.block_size(block);
        }
        if let Some(stop) = self.stop {
            params = params.stop(stop);
        }
        if let Some(max_steps) = self.max_steps {
            params = params.max_steps(max_steps);
        }
        if let Some(anneal_step) = self.anneal_step {
            params = params.anneal_step(anneal_step);
        }
        if let Some(anneal_deg) = self.anneal_deg {
            params = params.anneal_deg(anneal_deg);
        }
        if let Some(momentum) = self.momentum {
            params = params.momentum(momentum);
        }
        if let Some(sphering) = self.sphering {
            params = params.sphering(sphering);
        }
        if let Some(bias) = self.bias {
            params = params.bias(bias);
        }
        if let Some(extended) = self.extended {
            params = params.extended(extended);
        }
        if let Some(posact) = self.posact {
            params = params.posact(posact);
        }
        if let Some(seed) = self.seed {
            params = params.random_state(seed);
        }
        match self.partitions {
            Some(1) | None => {
                if self.merge_interval.is_some() {
                    log::warn!("mergeinterval has no effect without partitions");
                }
            }
            Some(partitions) => {
                params = params.execution(Execution::Partitioned {
                    partitions,
                    merge_interval: self.merge_interval.unwrap_or(DEFAULT_MERGE_INTERVAL),
                });
            }
        }
        params.check_ref()?;

        let config = RunConfig {
            data_file,
            weights_in: self.weights_in,
            weights_out,
            sphere_file,
            activations_file: self.activations_file,
            bias_file: self.bias_file,
            sign_file: self.sign_file,
            channels,
            frames,
            epochs,
            layout: self.layout.unwrap_or_default(),
            verbose: self.verbose,
            params,
        };
        element_count(channels, config.datalength()?)?;
        Ok(config)
    }
}
