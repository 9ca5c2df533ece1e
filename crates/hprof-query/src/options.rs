use hprof_format::DecodeOptions;
use serde::{Deserialize, Serialize};

/// Options for decoding a dump and resolving it into a [`crate::HeapIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub decode: DecodeOptions,
    /// Rewrite JVM-internal class names (`java/lang/String`) to dotted form.
    pub dotted_class_names: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            decode: DecodeOptions::default(),
            dotted_class_names: true,
        }
    }
}

impl BuildOptions {
    /// Loads options from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hprof_format::HeapInfoPolicy;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let options = BuildOptions::from_json("{}").unwrap();
        assert_eq!(options, BuildOptions::default());
        assert!(options.dotted_class_names);

        let options =
            BuildOptions::from_json(r#"{"decode":{"heap_info":"forward"},"dotted_class_names":false}"#)
                .unwrap();
        assert_eq!(options.decode.heap_info, HeapInfoPolicy::Forward);
        assert!(!options.dotted_class_names);

        assert!(BuildOptions::from_json(r#"{"decode":{"heap_info":"sideways"}}"#).is_err());
    }
}
