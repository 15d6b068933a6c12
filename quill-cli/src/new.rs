use std::{fs, path::PathBuf};

use crate::{
    manifest::Manifest,
    status::Status,
    MANIFEST,
};

const GREETING: &str = "\
#Narrator Hello, Quill!
@visits = 1
export @visits
";

pub fn new(package: PathBuf) -> Result<(), String> {
    let name = package
        .file_name()
        .ok_or("Can not determine directory name")?
        .to_str()
        .ok_or("Directory name is not representable")?
        .to_owned();

    fs::create_dir_all(&package).map_err(|_| "Unable to create project directory")?;

    let manifest = if package.join(MANIFEST).is_file() {
        Status::warn().log(format!("The manifest file ({}) has already been created", MANIFEST));
        Manifest::package(&package)?.0
    } else {
        let manifest = Manifest::new(name.clone());
        fs::write(
            package.join(MANIFEST),
            toml::to_string_pretty(&manifest).map_err(|_| "Could not generate manifest file")?,
        )
        .map_err(|_| "Could not write manifest file")?;
        manifest
    };

    let root = manifest.script_root(&package);
    if root.is_dir() {
        Status::warn().log(format!(
            "The script directory ({}/) has already been created",
            manifest.scripts.root
        ))
    } else {
        fs::create_dir_all(&root).map_err(|_| "Could not create script directory")?;
    }

    let entry = root.join(&manifest.project.entry).with_extension(&manifest.scripts.extension);
    if entry.is_file() {
        Status::warn().log(format!("The entry script ({}) has already been created", entry.display()));
    } else {
        fs::write(&entry, GREETING).map_err(|_| "Could not create entry script")?;
    }

    let translations = manifest.translation_root(&package);
    if !translations.is_dir() {
        fs::create_dir_all(&translations).map_err(|_| "Could not create translation directory")?;
    }

    Status::created().log(format!("project '{}'", name));
    Ok(())
}
