//! Identity extraction for Windows **p**ortable **e**xecutables.
//!
//! Supports:
//! * Reading the target machine from the PE headers
//! * Reading version strings across all declared translations
//! * Reconstructing the complete icon as a standalone `.ico` file
//! * Reading and patching the assembly identity of application manifests
//! * Quoting and splitting command lines the way the Windows tokenizer does
//!
//! Executables are only ever read as data. See [`ExecutableIdentity`] for the main entry point.
//!
//! # Examples
//!
//! ### Replacement artifacts
//! ```
//! use exeident::ExecutableIdentity;
//!
//! // read the identity of the executable
//! let identity = ExecutableIdentity::inspect(BINARY_PATH);
//!
//! // write the icon and a manifest carrying the derived assembly identity
//! let artifacts = identity.write_artifacts(MANIFEST_TEMPLATE_PATH, &identity.derived_identity())?;
//! ```
//!
//! ### Argument forwarding
//! ```
//! use exeident::{join_args, split_command_line};
//!
//! let command_line = join_args(["game.exe", "-screen-width", "1920", "C:\\Saves Folder\\"]);
//! assert_eq!(split_command_line(&command_line)[3], "C:\\Saves Folder\\");
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(doc)))]

pub(crate) mod cmdline;
pub(crate) mod errors;
pub(crate) mod header;
pub(crate) mod icon;
pub(crate) mod identity;
pub(crate) mod image;
pub(crate) mod manifest;
pub(crate) mod resource;
#[cfg(all(windows, feature = "images"))]
pub(crate) mod shell;
pub(crate) mod util;
pub(crate) mod version;

pub mod constants;
pub mod types;

pub use crate::{
    cmdline::*,
    errors::*,
    header::*,
    icon::*,
    identity::*,
    image::*,
    manifest::*,
    resource::*,
    version::*,
};
