/// `path` carries one of `extensions` (case-insensitive, without the dot).
pub fn has_scannable_ext(path: &std::path::Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

#[test]
fn scannable_ext_matches_case_insensitively() {
  let exts = vec!["java".to_string()];
  let cases = [
    ("Foo.java",  true),
    ("FOO.JAVA",  true),
    ("Foo.jav",   false),
    ("java",      false),   // no extension
    ("Foo.class", false),
  ];

  for (file, expected) in cases {
    assert_eq!(has_scannable_ext(std::path::Path::new(file), &exts), expected, "case: {file}");
  }
}
