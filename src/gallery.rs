use crate::config::Output;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use v_htmlescape::escape;

/// 画廊中会列出的图片格式
const IMAGE_EXTS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "avif"];

/// 递归列出目录下所有图片，按路径排序
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = vec![];
    if dir.is_dir() {
        walk(dir, &mut images)?;
    }
    images.sort();
    Ok(images)
}

fn walk(dir: &Path, images: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, images)?;
        } else if is_image(&path) {
            images.push(path);
        }
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 图片相对于 html 文件的地址，各级路径分别转义
fn image_src(image: &Path, base: &Path) -> String {
    let relative = image.strip_prefix(base).unwrap_or(image);
    relative
        .components()
        .filter_map(|c| match c {
            Component::CurDir => None,
            Component::RootDir => Some(String::new()),
            other => Some(escape(&other.as_os_str().to_string_lossy()).to_string()),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// 生成画廊 html，srcs 需已转义
pub fn render(srcs: &[String], lang: &str, dir: &str) -> String {
    let img_tags = srcs
        .iter()
        .map(|src| format!(r#"    <img src="{}" loading="lazy">"#, src))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<!DOCTYPE html>
<html lang="{lang}" dir="{dir}">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Gallery</title>
  <style>
    body {{ margin: 0; background: #111; }}
    .grid {{
      display: grid;
      grid-template-columns: repeat(auto-fill, minmax(240px, 1fr));
      gap: 4px;
      padding: 4px;
    }}
    img {{
      width: 100%;
      aspect-ratio: 1;
      object-fit: cover;
      display: block;
    }}
  </style>
</head>
<body>
  <div class="grid">
{img_tags}
  </div>
</body>
</html>
"#,
        lang = escape(lang),
        dir = escape(dir),
        img_tags = img_tags,
    )
}

/// 根据图片目录生成 index.html，返回列出的图片数量
pub fn build(output: &Output) -> Result<usize> {
    let images = list_images(&output.images_dir)?;
    if images.is_empty() {
        info!("没有图片，不生成画廊");
        return Ok(0);
    }

    let base = output
        .index
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let base = base.strip_prefix(".").unwrap_or(base);
    let srcs = images
        .iter()
        .map(|image| image_src(image.strip_prefix("./").unwrap_or(image), base))
        .collect::<Vec<_>>();

    let html = render(&srcs, &output.lang, &output.dir);
    fs::write(&output.index, html)
        .with_context(|| format!("无法写入 {}", output.index.display()))?;
    info!("已生成 {}，共 {} 张图片", output.index.display(), images.len());
    Ok(images.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_in(root: &Path) -> Output {
        Output {
            images_dir: root.join("images"),
            index: root.join("index.html"),
            ..Output::default()
        }
    }

    #[test]
    fn lists_only_images() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        fs::create_dir_all(images.join("old")).unwrap();
        fs::write(images.join("img_0001.png"), b"x").unwrap();
        fs::write(images.join("img_0000.JPG"), b"x").unwrap();
        fs::write(images.join("old/img_0000.webp"), b"x").unwrap();
        fs::write(images.join("notes.txt"), b"x").unwrap();
        fs::write(images.join("noext"), b"x").unwrap();

        let listed = list_images(&images).unwrap();
        assert_eq!(
            listed,
            vec![
                images.join("img_0000.JPG"),
                images.join("img_0001.png"),
                images.join("old/img_0000.webp"),
            ]
        );
    }

    #[test]
    fn html_lists_exactly_saved_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = output_in(dir.path());
        fs::create_dir_all(&output.images_dir).unwrap();
        fs::write(output.images_dir.join("img_0000.jpg"), b"x").unwrap();
        fs::write(output.images_dir.join("img_0001.gif"), b"x").unwrap();
        fs::write(output.images_dir.join("readme.md"), b"x").unwrap();

        assert_eq!(build(&output).unwrap(), 2);
        let html = fs::read_to_string(&output.index).unwrap();
        assert_eq!(html.matches("<img ").count(), 2);
        assert!(html.contains(r#"<img src="images/img_0000.jpg" loading="lazy">"#));
        assert!(html.contains(r#"<img src="images/img_0001.gif" loading="lazy">"#));
        assert!(html.contains(r#"<html lang="ar" dir="rtl">"#));
        assert!(html.contains("minmax(240px, 1fr)"));
    }

    #[test]
    fn no_images_no_html() {
        let dir = tempfile::tempdir().unwrap();
        let output = output_in(dir.path());
        assert_eq!(build(&output).unwrap(), 0);
        assert!(!output.index.exists());
    }

    #[test]
    fn src_is_relative_and_escaped() {
        assert_eq!(
            image_src(Path::new("out/images/a b.jpg"), Path::new("out")),
            "images/a b.jpg"
        );
        assert_eq!(image_src(Path::new("images/x.png"), Path::new("")), "images/x.png");

        let src = image_src(Path::new(r#"images/a"b&.jpg"#), Path::new(""));
        assert_eq!(src, "images/a&quot;b&amp;.jpg");

        let html = render(&[src], "en", "ltr");
        assert!(html.contains(r#"<img src="images/a&quot;b&amp;.jpg" loading="lazy">"#));
        assert!(html.contains(r#"<html lang="en" dir="ltr">"#));
    }
}
