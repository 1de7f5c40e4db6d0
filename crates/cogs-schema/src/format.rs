use crate::manifest::ManifestError;
use std::fmt;
use std::str::FromStr;

/// How the document (or the node at a link's sub-path) is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReadType {
    /// Infer from the file suffix and decode the node as a flat key/value map.
    #[default]
    Deferred,
    Dotenv,
    Json,
    Yaml,
    Toml,
    /// `json{}`: keep the looked-up value as a nested structure.
    JsonComplex,
    YamlComplex,
    TomlComplex,
    /// Associate the whole node at the sub-path with the key.
    Whole,
    /// Associate the unparsed file contents with the key.
    Raw,
    /// Resolve a context of a nested manifest.
    Gear,
}

impl ReadType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deferred => "",
            Self::Dotenv => "dotenv",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::JsonComplex => "json{}",
            Self::YamlComplex => "yaml{}",
            Self::TomlComplex => "toml{}",
            Self::Whole => "whole",
            Self::Raw => "raw",
            Self::Gear => "gear",
        }
    }

    /// Complex read types keep structured values instead of flattening to scalars.
    pub fn is_complex(self) -> bool {
        matches!(
            self,
            Self::JsonComplex | Self::YamlComplex | Self::TomlComplex | Self::Whole
        )
    }

    /// Format used to parse a string node for this read type, if any.
    pub fn text_format(self) -> Option<Format> {
        match self {
            Self::Json | Self::JsonComplex => Some(Format::Json),
            Self::Yaml | Self::YamlComplex => Some(Format::Yaml),
            Self::Toml | Self::TomlComplex => Some(Format::Toml),
            Self::Dotenv => Some(Format::Dotenv),
            Self::Deferred | Self::Whole | Self::Raw | Self::Gear => None,
        }
    }
}

impl FromStr for ReadType {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let read_type = match s {
            "" => Self::Deferred,
            "dotenv" => Self::Dotenv,
            "json" => Self::Json,
            "yaml" => Self::Yaml,
            "toml" => Self::Toml,
            "json{}" => Self::JsonComplex,
            "yaml{}" => Self::YamlComplex,
            "toml{}" => Self::TomlComplex,
            "whole" => Self::Whole,
            "raw" => Self::Raw,
            "gear" => Self::Gear,
            other => return Err(ManifestError::InvalidReadType(other.to_owned())),
        };
        Ok(read_type)
    }
}

impl fmt::Display for ReadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deferred => "deferred",
            Self::Dotenv => "dotenv",
            Self::Json => "flat json",
            Self::Yaml => "flat yaml",
            Self::Toml => "flat toml",
            Self::JsonComplex => "complex json",
            Self::YamlComplex => "complex yaml",
            Self::TomlComplex => "complex toml",
            Self::Whole => "whole file",
            Self::Raw => "whole unserialized file",
            Self::Gear => "gear object",
        };
        f.write_str(s)
    }
}

/// Document notation, used both for reading sources and rendering output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Yaml,
    Toml,
    Dotenv,
    /// Unknown notation on input; delimited values on output.
    Raw,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Dotenv => "dotenv",
            Self::Raw => "raw",
        }
    }

    /// Detect the format of a file path or URL from its suffix.
    pub fn for_path(path: &str) -> Self {
        // query strings and fragments never carry the suffix
        let path = path.split(['?', '#']).next().unwrap_or(path);
        if is_yaml_file(path) {
            Self::Yaml
        } else if is_toml_file(path) {
            Self::Toml
        } else if is_json_file(path) {
            Self::Json
        } else if is_env_file(path) {
            Self::Dotenv
        } else {
            Self::Raw
        }
    }

    /// Whether rendered output must hold flat string values.
    pub fn is_line_oriented(self) -> bool {
        matches!(self, Self::Dotenv | Self::Raw)
    }
}

impl FromStr for Format {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "dotenv" => Ok(Self::Dotenv),
            "raw" => Ok(Self::Raw),
            other => Err(ManifestError::InvalidFormat(other.to_owned())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_yaml_file(path: &str) -> bool {
    path.ends_with(".yaml") || path.ends_with(".yml")
}

pub fn is_toml_file(path: &str) -> bool {
    path.ends_with(".toml") || path.ends_with(".tml")
}

pub fn is_json_file(path: &str) -> bool {
    path.ends_with(".json")
}

pub fn is_env_file(path: &str) -> bool {
    path.ends_with(".env")
}
