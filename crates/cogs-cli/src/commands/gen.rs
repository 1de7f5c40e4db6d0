use super::{core_error, split_list, EXIT_SUCCESS};
use crate::render;
use clap::Args;
use cogs_core::{
    CoreError, DefaultLoader, Gear, LinkFilter, ResolveOptions, Resolver, DEFAULT_RECURSION_LIMIT,
};
use cogs_schema::{FlatMap, Format};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Args)]
pub struct GenArgs {
    /// Path to the cog manifest.
    pub file: PathBuf,

    /// Contexts to resolve; their outputs are joined.
    #[arg(required = true)]
    pub contexts: Vec<String>,

    /// Skip fetching encrypted vars.
    #[arg(short = 'n', long, default_value_t = false)]
    pub no_enc: bool,

    /// Fetch encrypted vars without decrypting them.
    #[arg(long, default_value_t = false)]
    pub no_decrypt: bool,

    /// Substitute process environment variables into the manifest.
    #[arg(short = 'e', long, default_value_t = false)]
    pub envsubst: bool,

    /// Include only these keys, comma separated.
    #[arg(long)]
    pub keys: Option<String>,

    /// Exclude these keys, comma separated. Applied before --keys.
    #[arg(long)]
    pub not: Option<String>,

    /// Output type: json, toml, yaml, dotenv or raw.
    #[arg(long, default_value = "json")]
    pub out: String,

    /// With --out=dotenv: prepend "export " to each line.
    #[arg(short = 'x', long, default_value_t = false)]
    pub export: bool,

    /// With --out=dotenv: keep variable casing.
    #[arg(short = 'p', long, default_value_t = false)]
    pub preserve: bool,

    /// With --out=raw: delimit values with this separator.
    #[arg(long)]
    pub sep: Option<String>,

    /// Maximum depth of nested gear manifests.
    #[arg(long, default_value_t = DEFAULT_RECURSION_LIMIT)]
    pub recursion_limit: usize,
}

impl GenArgs {
    /// Check flag combinations and return the output format.
    pub fn validate(&self) -> Result<Format, String> {
        let format: Format = self
            .out
            .parse()
            .map_err(|_| format!("invalid opt: --out={}", self.out))?;
        if format != Format::Raw && self.sep.is_some() {
            return Err("invalid opt: --sep is only valid with --out=raw".to_owned());
        }
        if format != Format::Dotenv {
            if self.export {
                return Err("invalid opt: --export is only valid with --out=dotenv".to_owned());
            }
            if self.preserve {
                return Err("invalid opt: --preserve is only valid with --out=dotenv".to_owned());
            }
        }
        Ok(format)
    }

    fn options(&self) -> ResolveOptions {
        ResolveOptions {
            skip_encrypted: self.no_enc,
            skip_decrypt: self.no_decrypt,
            env_subst: self.envsubst,
            recursion_limit: self.recursion_limit,
        }
    }

    /// Key renaming applied per context before joining dotenv output.
    fn dotenv_key(&self, key: &str) -> String {
        let key = if self.preserve {
            key.to_owned()
        } else {
            render::upper_snake_case(key)
        };
        if self.export {
            format!("export {key}")
        } else {
            key
        }
    }
}

pub fn run(args: &GenArgs) -> Result<u8, String> {
    let format = args.validate()?;
    let keys = split_list(args.keys.as_deref());
    let not = split_list(args.not.as_deref());

    let loader = DefaultLoader::new();
    let resolver = Resolver::new(&loader, args.options()).map_err(|e| core_error(&e))?;
    let gear = Gear::load(&args.file, args.envsubst).map_err(|e| core_error(&e))?;
    let filter = LinkFilter::new(keys.clone(), not.clone());

    let mut maps = Vec::with_capacity(args.contexts.len());
    for context in &args.contexts {
        let map = resolver
            .resolve(&gear, context, &filter, format)
            .map_err(|e| filter_error(&e, &not, args.no_enc))?;
        debug!("context '{context}' produced {} keys", map.len());
        maps.push(map);
    }

    // dotenv keys are renamed first so that keyValue and key_value collide
    if format == Format::Dotenv {
        maps = maps
            .into_iter()
            .map(|map| {
                map.into_iter()
                    .map(|(key, value)| (args.dotenv_key(&key), value))
                    .collect()
            })
            .collect();
    }
    let joined = join(maps)?;

    let output = match format {
        Format::Json => render::json(&joined)?,
        Format::Yaml => render::yaml(&joined)?,
        Format::Toml => render::toml(&joined)?,
        Format::Dotenv => render::dotenv(&joined)?,
        Format::Raw => render::raw(&joined, &keys, args.sep.as_deref().unwrap_or_default())?,
    };
    print!("{output}");
    Ok(EXIT_SUCCESS)
}

/// Merge per-context maps; a key produced twice is an error.
pub fn join(maps: Vec<FlatMap>) -> Result<FlatMap, String> {
    let mut joined = FlatMap::new();
    for map in maps {
        for (key, value) in map {
            if joined.contains_key(&key) {
                return Err(format!("duplicate key '{key}' produced by more than one context"));
            }
            joined.insert(key, value);
        }
    }
    Ok(joined)
}

fn filter_error(err: &CoreError, not: &[String], no_enc: bool) -> String {
    let CoreError::FilteredKeyMissing(key) = err else {
        return core_error(err);
    };
    let mut msg = format!("--keys: {err}");
    if not.contains(key) {
        msg.push_str(&format!(
            "\n\n--not={key} and --keys={key} were both given: a key cannot be included and excluded"
        ));
    }
    if no_enc {
        msg.push_str("\n\n--no-enc was given: was it an encrypted value?");
    }
    msg
}
