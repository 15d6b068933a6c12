use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::MANIFEST;

/// A project's `quill.toml`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub project: Project,
    #[serde(default)]
    pub scripts: Scripts,
    #[serde(default)]
    pub language: Language,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    /// Script id run by `quill run`.
    #[serde(default = "default_entry")]
    pub entry: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scripts {
    /// Directory script ids are resolved against.
    pub root: String,
    pub extension: String,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Language {
    pub active: Option<String>,
    /// Directory holding `<language>/<script>.toml` tables.
    #[serde(default = "default_translations")]
    pub translations: String,
}

fn default_entry() -> String {
    "main".to_string()
}

fn default_translations() -> String {
    "translations".to_string()
}

impl Default for Scripts {
    fn default() -> Scripts {
        Scripts {
            root: "scripts".to_string(),
            extension: "qs".to_string(),
        }
    }
}

impl Manifest {
    pub fn new(name: String) -> Manifest {
        Manifest {
            project: Project { name, entry: default_entry() },
            scripts: Scripts::default(),
            language: Language {
                active: None,
                translations: default_translations(),
            },
        }
    }

    /// Searches up from `path` for a manifest,
    /// returning it along with the project directory.
    pub fn package(mut path: &Path) -> Result<(Manifest, &Path), String> {
        let source = loop {
            match fs::read_to_string(path.join(MANIFEST)) {
                Ok(source) => break source,
                Err(_) => {
                    path = path
                        .parent()
                        .ok_or("The manifest file could not be found")?;
                },
            }
        };

        let manifest = Manifest::parse(&source)
            .map_err(|e| format!("Could not parse the manifest file: {}", e))?;
        Ok((manifest, path))
    }

    pub fn parse(source: &str) -> Result<Manifest, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn script_root(&self, project: &Path) -> PathBuf {
        project.join(&self.scripts.root)
    }

    pub fn translation_root(&self, project: &Path) -> PathBuf {
        project.join(&self.language.translations)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let manifest = Manifest::parse("[project]\nname = \"demo\"\n").unwrap();
        assert_eq!(manifest, Manifest::new("demo".to_string()));
        assert_eq!(manifest.script_root(Path::new("game")), PathBuf::from("game/scripts"));
    }

    #[test]
    fn full() {
        let manifest = Manifest::parse(
            "[project]\nname = \"demo\"\nentry = \"intro\"\n\
             [scripts]\nroot = \"src\"\nextension = \"quill\"\n\
             [language]\nactive = \"fr\"\ntranslations = \"lang\"\n",
        )
        .unwrap();
        assert_eq!(manifest.project.entry, "intro");
        assert_eq!(manifest.scripts.extension, "quill");
        assert_eq!(manifest.language.active.as_deref(), Some("fr"));
        assert_eq!(manifest.translation_root(Path::new(".")), PathBuf::from("./lang"));
    }

    #[test]
    fn written_manifests_parse() {
        let manifest = Manifest::new("round".to_string());
        let written = toml::to_string_pretty(&manifest).unwrap();
        assert_eq!(Manifest::parse(&written).unwrap(), manifest);
    }

    #[test]
    fn missing_name() {
        assert!(Manifest::parse("[project]\nentry = \"main\"\n").is_err());
    }
}
