use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

pub const USAGE: &str = "\
Usage: show-files <image-file-path> [<csv-file-path>]

- Read image metadata
- Extract basic image properties
- List used files per well

If <csv-file-path> is provided the used files per well are also written to the csv file
";

/// Command line of `show-files`. Help and version flags are off so every
/// argument is a path.
#[derive(Parser, Debug)]
#[command(name = "show-files", disable_help_flag = true, disable_version_flag = true)]
struct ShowFilesArgs {
    #[arg(allow_hyphen_values = true)]
    image_path: Option<PathBuf>,

    #[arg(allow_hyphen_values = true)]
    csv_path: Option<PathBuf>,

    #[arg(num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    extra: Vec<OsString>,
}

/// Everything one report run needs, parsed from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Image (or companion) file to open.
    pub image_path: PathBuf,
    /// Where to write the used-files CSV, if anywhere.
    pub csv_path: Option<PathBuf>,
}

impl RunConfig {
    /// Build a config from the arguments following the program name.
    /// Returns `Ok(None)` when no image path was given.
    pub fn from_args<I, S>(args: I) -> Result<Option<Self>, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let argv = std::iter::once(OsString::from("show-files"))
            .chain(args.into_iter().map(Into::into));
        let parsed = ShowFilesArgs::try_parse_from(argv)?;

        if !parsed.extra.is_empty() {
            log::warn!("Ignoring {} extra argument(s)", parsed.extra.len());
        }

        Ok(parsed.image_path.map(|image_path| RunConfig {
            image_path,
            csv_path: parsed.csv_path,
        }))
    }
}
