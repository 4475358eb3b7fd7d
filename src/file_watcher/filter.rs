//! Фильтр событий: корень наблюдения + белый список расширений.

use std::path::{Component, Path, PathBuf};

/// Допустимые расширения (сравнение без учёта регистра).
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["xlsx", "xls", "csv", "pdf", "doc", "docx"];

#[derive(Clone, Debug)]
pub struct PathFilter {
  roots: Vec<PathBuf>,
}

impl PathFilter {
  /// Корни приводятся к лексически нормализованной форме. Если корень
  /// существует и его каноническая форма отличается (симлинки, `/private/var`
  /// на macOS), она тоже принимается.
  pub fn new<I, P>(roots: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
  {
    let mut normalized = Vec::new();
    for root in roots {
      let root = root.as_ref();
      let lexical = normalize(root);
      if let Ok(canonical) = std::fs::canonicalize(root) {
        let canonical = normalize(&canonical);
        if !normalized.contains(&canonical) {
          normalized.push(canonical);
        }
      }
      if !normalized.contains(&lexical) {
        normalized.push(lexical);
      }
    }
    Self { roots: normalized }
  }

  pub fn roots(&self) -> &[PathBuf] {
    &self.roots
  }

  pub fn accept(&self, path: &Path) -> bool {
    has_allowed_extension(path) && self.matching_root(path).is_some()
  }

  /// Корень, под которым лежит путь (сравнение по компонентам).
  pub fn matching_root(&self, path: &Path) -> Option<&Path> {
    let path = normalize(path);
    self
      .roots
      .iter()
      .find(|root| path.starts_with(root) && path != **root)
      .map(PathBuf::as_path)
  }
}

/// Проверка по окончанию имени, поэтому `.pdf` без основы тоже проходит
/// (`Path::extension` для такого имени возвращает `None`).
pub fn has_allowed_extension(path: &Path) -> bool {
  let Some(name) = path.file_name() else {
    return false;
  };
  let name = name.to_string_lossy().to_lowercase();
  ALLOWED_EXTENSIONS.iter().any(|ext| {
    name
      .strip_suffix(ext)
      .is_some_and(|stem| stem.ends_with('.'))
  })
}

/// Лексическая нормализация: убирает `.` и схлопывает `..`, не трогая ФС.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn filter() -> PathFilter {
    PathFilter::new(["/data/QUALITY", "/data/FORMS/"])
  }

  #[test]
  fn accepts_allowed_file_under_root() {
    let f = filter();
    assert!(f.accept(Path::new("/data/QUALITY/form.xlsx")));
    assert!(f.accept(Path::new("/data/QUALITY/2024/deep/Report.PDF")));
    assert!(f.accept(Path::new("/data/FORMS/list.csv")));
  }

  #[test]
  fn rejects_paths_outside_roots() {
    let f = filter();
    assert!(!f.accept(Path::new("/other/shared/report.pdf")));
    assert!(!f.accept(Path::new("/data/QUALITY2/form.xlsx")));
    assert!(!f.accept(Path::new("/data/QUALITY/../secret/form.xlsx")));
  }

  #[test]
  fn rejects_disallowed_extensions() {
    let f = filter();
    assert!(!f.accept(Path::new("/data/QUALITY/notes.txt")));
    assert!(!f.accept(Path::new("/data/QUALITY/archive.xlsx.bak")));
    assert!(!f.accept(Path::new("/data/QUALITY/noext")));
  }

  #[test]
  fn extension_check_is_case_insensitive() {
    for name in ["a.XLSX", "a.Xls", "a.CSV", "a.pdf", "a.Doc", "a.DOCX"] {
      assert!(has_allowed_extension(Path::new(name)), "{name}");
    }
  }

  #[test]
  fn bare_extension_names_are_accepted() {
    let f = filter();
    assert!(f.accept(Path::new("/data/QUALITY/.pdf")));
    assert!(f.accept(Path::new("/data/QUALITY/sub/.XLSX")));
    assert!(!f.accept(Path::new("/data/QUALITY/pdf")));
    assert!(!f.accept(Path::new("/data/QUALITY/.txt")));
  }

  #[test]
  fn matching_root_returns_the_configured_root() {
    let f = filter();
    assert_eq!(
      f.matching_root(Path::new("/data/FORMS/./sub/x.doc")),
      Some(Path::new("/data/FORMS"))
    );
    assert_eq!(f.matching_root(Path::new("/data/FORMS")), None);
  }
}
