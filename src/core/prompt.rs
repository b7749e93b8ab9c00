//! Prompt assembly from arguments, stdin, and attachments.

use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine;

use crate::backend::ImageAttachment;
use crate::error::{QuillError, Result};

/// Raw prompt sources in the order the user supplied them.
#[derive(Debug, Clone, Default)]
pub struct PromptInput {
    /// Positional prompt words.
    pub args: Vec<String>,
    /// Text file attachments, `--file` order.
    pub files: Vec<PathBuf>,
    /// Image attachments, `--image` order.
    pub images: Vec<PathBuf>,
    /// Piped stdin, when not a TTY.
    pub stdin: Option<String>,
    /// Whether a system prompt was resolved for this run. A system prompt
    /// alone is a complete invocation, like an image alone.
    pub has_system: bool,
}

/// The assembled user turn.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub text: String,
    pub images: Vec<ImageAttachment>,
}

/// Assemble the user turn: file attachments in given order, each delimited
/// and labeled with its source path, then piped stdin, then positional
/// arguments.
///
/// # Errors
///
/// Returns [`QuillError::EmptyPrompt`] when no source contributes anything
/// and no system prompt is set, or an I/O error naming the attachment that
/// could not be read.
pub fn assemble(input: &PromptInput) -> Result<AssembledPrompt> {
    let mut sections: Vec<String> = Vec::new();

    for path in &input.files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read attachment {}", path.display()))?;
        sections.push(format!(
            "--- file: {} ---\n{}\n--- end file ---",
            path.display(),
            content.trim_end()
        ));
    }

    if let Some(stdin) = &input.stdin {
        if !stdin.trim().is_empty() {
            sections.push(stdin.trim_end().to_string());
        }
    }

    let args = input.args.join(" ");
    if !args.trim().is_empty() {
        sections.push(args.trim().to_string());
    }

    let images = input
        .images
        .iter()
        .map(|path| load_image(path))
        .collect::<Result<Vec<_>>>()?;

    if sections.is_empty() && images.is_empty() && !input.has_system {
        return Err(QuillError::EmptyPrompt);
    }

    Ok(AssembledPrompt {
        text: sections.join("\n\n"),
        images,
    })
}

fn load_image(path: &Path) -> Result<ImageAttachment> {
    let media_type = media_type_for(path)?;
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image {}", path.display()))?;
    Ok(ImageAttachment {
        path: path.display().to_string(),
        media_type: media_type.to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

fn media_type_for(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        _ => Err(anyhow::anyhow!(
            "unsupported image type for {} (expected png, jpg, gif, or webp)",
            path.display()
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_only() {
        let input = PromptInput {
            args: vec!["what".to_string(), "is".to_string(), "rust".to_string()],
            ..PromptInput::default()
        };
        let prompt = assemble(&input).unwrap();
        assert_eq!(prompt.text, "what is rust");
    }

    #[test]
    fn attachment_then_stdin_then_args() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "line one\n").unwrap();

        let input = PromptInput {
            args: vec!["summarize".to_string()],
            files: vec![file.clone()],
            stdin: Some("piped context\n".to_string()),
            ..PromptInput::default()
        };
        let prompt = assemble(&input).unwrap();

        let file_pos = prompt.text.find("line one").unwrap();
        let stdin_pos = prompt.text.find("piped context").unwrap();
        let args_pos = prompt.text.find("summarize").unwrap();
        assert!(file_pos < stdin_pos && stdin_pos < args_pos);
        // The attachment is labeled with its source path.
        assert!(prompt.text.contains(&format!("--- file: {} ---", file.display())));
    }

    #[test]
    fn attachments_keep_given_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "alpha").unwrap();
        std::fs::write(&b, "beta").unwrap();

        let input = PromptInput {
            args: vec!["compare".to_string()],
            files: vec![b, a],
            ..PromptInput::default()
        };
        let prompt = assemble(&input).unwrap();
        assert!(prompt.text.find("beta").unwrap() < prompt.text.find("alpha").unwrap());
    }

    #[test]
    fn whitespace_only_sources_are_empty() {
        let input = PromptInput {
            args: vec!["  ".to_string()],
            stdin: Some("\n\n".to_string()),
            ..PromptInput::default()
        };
        assert!(matches!(assemble(&input), Err(QuillError::EmptyPrompt)));
    }

    #[test]
    fn image_alone_is_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("shot.png");
        std::fs::write(&image, [0x89, 0x50, 0x4e, 0x47]).unwrap();

        let input = PromptInput {
            images: vec![image],
            ..PromptInput::default()
        };
        let prompt = assemble(&input).unwrap();
        assert!(prompt.text.is_empty());
        assert_eq!(prompt.images.len(), 1);
        assert_eq!(prompt.images[0].media_type, "image/png");
        assert!(!prompt.images[0].data.is_empty());
    }

    #[test]
    fn system_prompt_alone_is_not_empty() {
        let input = PromptInput {
            has_system: true,
            ..PromptInput::default()
        };
        let prompt = assemble(&input).unwrap();
        assert!(prompt.text.is_empty());
        assert!(prompt.images.is_empty());
    }

    #[test]
    fn unknown_image_extension_is_rejected() {
        let input = PromptInput {
            images: vec![PathBuf::from("diagram.svg")],
            ..PromptInput::default()
        };
        let err = assemble(&input).unwrap_err();
        assert!(err.to_string().contains("diagram.svg"));
    }

    #[test]
    fn missing_attachment_names_the_path() {
        let input = PromptInput {
            args: vec!["x".to_string()],
            files: vec![PathBuf::from("/no/such/file.txt")],
            ..PromptInput::default()
        };
        let err = assemble(&input).unwrap_err();
        assert!(err.to_string().contains("/no/such/file.txt"));
    }
}
