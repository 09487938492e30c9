//! Global colors.

use nu_ansi_term::Color;

/// The attention color (errors, dry-run markers).
pub(crate) const ATTENTION_COLOR: Color = Color::Red;

/// The information color (release and flavor).
pub(crate) const INFO_COLOR: Color = Color::Cyan;

/// The color used to colorise paths.
pub(crate) const PATH_COLOR: Color = Color::LightBlue;

/// The color used to report a finished installation.
pub(crate) const SUCCESS_COLOR: Color = Color::Green;
