//! # Path Resolution Module
//!
//! Centralizza il calcolo del path in cui viene scritto un file convertito.
//!
//! I nomi in stile release portano il codec come token (`Movie.2019.1080p.x264-GRP`).
//! Il token viene riscritto con il codec di destinazione; ai nomi senza token si
//! aggiunge il codec, così un file convertito non collide mai con la sorgente.

use std::path::{Path, PathBuf};

/// Codec markers recognised in file stems, compared case-insensitively
const CODEC_TOKENS: [&str; 8] = ["x264", "h264", "avc", "x265", "h265", "hevc", "xvid", "divx"];

/// Target path for `source` encoded as `codec` into a `.extension` container.
///
/// The file lands in `target_dir` when given, otherwise next to the source.
pub fn build_target_filename(
    source: &Path,
    target_dir: Option<&Path>,
    codec: &str,
    extension: &str,
) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension.trim_start_matches('.');
    let dir = match target_dir {
        Some(dir) => dir.to_path_buf(),
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let (mut new_stem, replaced) = replace_codec_tokens(&stem, codec);
    if !replaced {
        new_stem = format!("{}.{}", stem, codec);
    }

    let target = dir.join(format!("{}.{}", new_stem, extension));
    if target == source {
        return dir.join(format!("{}.{}.{}", new_stem, codec, extension));
    }
    target
}

/// Replace every alphanumeric run that names a codec
fn replace_codec_tokens(stem: &str, codec: &str) -> (String, bool) {
    let mut out = String::with_capacity(stem.len());
    let mut replaced = false;
    let mut token = String::new();

    let mut flush = |token: &mut String, out: &mut String| {
        if CODEC_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            out.push_str(codec);
            replaced = true;
        } else {
            out.push_str(token);
        }
        token.clear();
    };

    for c in stem.chars() {
        if c.is_alphanumeric() {
            token.push(c);
        } else {
            flush(&mut token, &mut out);
            out.push(c);
        }
    }
    flush(&mut token, &mut out);

    (out, replaced)
}
