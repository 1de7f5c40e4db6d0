use crate::CoreError;
use cogs_schema::tree::simple_to_string;
use cogs_schema::{Format, Link, Value};

/// Shape a resolved link value for an output format.
///
/// Formats that nest (JSON, YAML, TOML) take the value as is. Line-oriented
/// formats (dotenv, raw) need strings: scalars are stringified losslessly and
/// structured values are serialized in the notation of the link's source,
/// falling back to JSON when the source notation is itself line-oriented.
pub fn project(link: &Link, output: Format) -> Result<Value, CoreError> {
    let value = link
        .value
        .as_ref()
        .ok_or_else(|| CoreError::MissingValue(link.key_name.clone()))?;
    if !output.is_line_oriented() {
        return Ok(value.clone());
    }
    if let Some(text) = simple_to_string(value) {
        return Ok(Value::String(text));
    }

    let format = match link.input_format() {
        Format::Yaml => Format::Yaml,
        Format::Toml => Format::Toml,
        Format::Json | Format::Dotenv | Format::Raw => Format::Json,
    };
    let serialize_error = |reason: String| CoreError::Serialize {
        name: link.key_name.clone(),
        format,
        reason,
    };
    let text = match format {
        Format::Yaml => serde_yaml::to_string(value).map_err(|e| serialize_error(e.to_string()))?,
        Format::Toml => toml::to_string(value).map_err(|e| serialize_error(e.to_string()))?,
        _ => serde_json::to_string(value).map_err(|e| serialize_error(e.to_string()))?,
    };
    Ok(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogs_schema::{Location, ReadType};

    fn resolved(path: &str, read_type: ReadType, value: Value) -> Link {
        let mut link = Link::sourced("k", Location::new(path, ""));
        link.read_type = read_type;
        link.value = Some(value);
        link
    }

    fn object() -> Value {
        serde_yaml::from_str("a: 1\nb: [x, y]\n").unwrap()
    }

    #[test]
    fn nested_formats_pass_through() {
        let link = resolved("./c.yaml", ReadType::Whole, object());
        assert_eq!(project(&link, Format::Json).unwrap(), object());
        assert_eq!(project(&link, Format::Toml).unwrap(), object());
    }

    #[test]
    fn scalars_become_strings_for_line_formats() {
        let link = resolved("./c.yaml", ReadType::Deferred, Value::Number(42.into()));
        assert_eq!(
            project(&link, Format::Dotenv).unwrap(),
            Value::String("42".into())
        );
        let link = resolved("./c.yaml", ReadType::Deferred, Value::Bool(true));
        assert_eq!(
            project(&link, Format::Raw).unwrap(),
            Value::String("true".into())
        );
    }

    #[test]
    fn complex_values_use_source_notation() {
        let link = resolved("./c.json", ReadType::JsonComplex, object());
        assert_eq!(
            project(&link, Format::Dotenv).unwrap(),
            Value::String(r#"{"a":1,"b":["x","y"]}"#.into())
        );

        let link = resolved("./c.yaml", ReadType::Whole, object());
        assert_eq!(
            project(&link, Format::Dotenv).unwrap(),
            Value::String("a: 1\nb:\n- x\n- y\n".into())
        );

        let link = resolved("./c.toml", ReadType::TomlComplex, object());
        let Value::String(text) = project(&link, Format::Raw).unwrap() else {
            panic!("expected a string");
        };
        assert!(text.contains("a = 1"));
    }

    #[test]
    fn dotenv_sources_fall_back_to_json() {
        let link = resolved("./c.env", ReadType::Whole, object());
        assert_eq!(
            project(&link, Format::Raw).unwrap(),
            Value::String(r#"{"a":1,"b":["x","y"]}"#.into())
        );
    }

    #[test]
    fn unresolved_link_is_an_error() {
        let link = Link::sourced("k", Location::new("./c.yaml", ""));
        assert!(matches!(
            project(&link, Format::Json),
            Err(CoreError::MissingValue(_))
        ));
    }
}
