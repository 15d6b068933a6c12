use std::{env::current_dir, ffi::OsStr, path::PathBuf};

use structopt::StructOpt;

pub fn package_dir(path: &OsStr) -> PathBuf {
    if path == "." {
        current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        PathBuf::from(path)
    }
}

#[derive(StructOpt, Debug)]
pub struct Package {
    #[structopt(default_value = ".", parse(from_os_str = package_dir))]
    pub path: PathBuf,
}

#[derive(StructOpt, Debug)]
#[structopt(name = "Quill", bin_name = "quill", about)]
pub enum Quill {
    /// Creates a new Quill project
    New(Package),
    /// Runs the entry script of the specified project
    Run {
        #[structopt(flatten)]
        package: Package,
        /// Language to translate dialogue into, overriding the manifest
        #[structopt(short, long)]
        language: Option<String>,
        /// Logs every instruction the runtime executes
        #[structopt(short, long)]
        verbose: bool,
    },
    /// Compiles a script into a container,
    /// writing its default translation table alongside
    Compile {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
        /// Where to write the container, defaults to the script with a `.qsc` extension
        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,
    },
    /// Disassembles a script or a compiled container
    Dump {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_run() {
        let quill = Quill::from_iter(vec!["quill", "run", "game", "--language", "fr"]);
        match quill {
            Quill::Run { package, language, verbose } => {
                assert_eq!(package.path, PathBuf::from("game"));
                assert_eq!(language.as_deref(), Some("fr"));
                assert!(!verbose);
            },
            other => panic!("parsed the wrong subcommand: {:?}", other),
        }
    }

    #[test]
    fn parses_compile() {
        let quill = Quill::from_iter(vec!["quill", "compile", "main.qs", "-o", "out.qsc"]);
        match quill {
            Quill::Compile { file, output } => {
                assert_eq!(file, PathBuf::from("main.qs"));
                assert_eq!(output, Some(PathBuf::from("out.qsc")));
            },
            other => panic!("parsed the wrong subcommand: {:?}", other),
        }
    }
}
