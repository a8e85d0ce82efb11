use crossbeam_channel::{Receiver, Sender, bounded};
use ignore::{WalkBuilder, WalkState, overrides::OverrideBuilder};
use std::{
    mem,
    path::{Path, PathBuf},
    thread,
};

use crate::utils::Config;
use crate::utils::ext::has_scannable_ext;

type Batch = Vec<PathBuf>;

struct Batcher {
    tx:    Sender<Batch>,
    batch: Batch,
    limit: usize,
}
impl Batcher {
    fn push(&mut self, p: PathBuf) {
        self.batch.push(p);
        if self.batch.len() >= self.limit {
            self.flush();
        }
    }
    fn flush(&mut self) {
        if !self.batch.is_empty() {
            let _ = self.tx.send(mem::take(&mut self.batch));
        }
    }
}
impl Drop for Batcher {
    fn drop(&mut self) { self.flush(); }
}

// ---------------------------------------------------------------------------
/// Walk `root` and send *batches* of source paths through the returned channel.
pub fn spawn_senders(root: &Path, cfg: &Config) -> Receiver<Batch> {
    // ----- 1  build ignore/override rules ----------------------------------
    let mut ob = OverrideBuilder::new(root);
    for ext in &cfg.scanner.excluded_extensions {
        if let Err(e) = ob.add(&format!("!*.{ext}")) {
            tracing::warn!("cannot add ignore pattern ‘{ext}’: {e}");
        }
    }
    for dir in &cfg.scanner.excluded_directories {
        if let Err(e) = ob.add(&format!("!**/{dir}/**")) {
            tracing::warn!("cannot add ignore pattern ‘{dir}’: {e}");
        }
    }
    let overrides = ob.build().unwrap_or_else(|e| {
        tracing::warn!("ignoring exclusion patterns: {e}");
        ignore::overrides::Override::empty()
    });

    // ----- 2  channel & thread pool parameters -----------------------------
    let workers     = cfg.performance.worker_threads.unwrap_or_else(num_cpus::get).max(1);
    let (tx, rx)    = bounded::<Batch>(workers * cfg.performance.channel_multiplier.max(1));
    let batch_size  = cfg.performance.batch_size.max(1);

    let root        = root.to_path_buf();
    let scanner     = cfg.scanner.clone();
    let max_bytes   = size_limit(scanner.max_file_size_mb);

    // ----- 3  the background walker thread ---------------------------------
    thread::spawn(move || {
        WalkBuilder::new(root)
          .hidden(!scanner.scan_hidden_files)
          .follow_links(scanner.follow_symlinks)
          .git_ignore(scanner.read_vcsignore)
          .git_exclude(scanner.read_vcsignore)
          .ignore(scanner.read_vcsignore)
          .git_global(scanner.read_global_ignore)
          .require_git(scanner.require_git_to_read_vcsignore)
          .same_file_system(scanner.one_file_system)
          .threads(workers)
          .overrides(overrides)
          .build_parallel()
          .run(|| {
              let mut b = Batcher {
                  tx:    tx.clone(),
                  batch: Vec::with_capacity(batch_size),
                  limit: batch_size,
              };
              let extensions = scanner.extensions.clone();

              Box::new(move |entry| {
                  let entry = match entry {
                      Ok(e) if e.file_type().map(|ft| ft.is_file()).unwrap_or(false) => e,
                      Ok(_) => return WalkState::Continue,
                      Err(e) => {
                          tracing::debug!("walk error: {e}");
                          return WalkState::Continue;
                      }
                  };
                  if !has_scannable_ext(entry.path(), &extensions) {
                      return WalkState::Continue;
                  }

                  if max_bytes != 0 {
                      match entry.metadata() {
                          Ok(m) if m.len() > max_bytes => {
                              tracing::debug!("{:?} exceeds max_file_size_mb", entry.path());
                              return WalkState::Continue;
                          }
                          Err(e) => {
                              tracing::debug!("metadata failed for {:?}: {e}", entry.path());
                              return WalkState::Continue;
                          }
                          _ => {}
                      }
                  }

                  tracing::trace!("sending {:?}", entry.path());
                  b.push(entry.into_path());
                  WalkState::Continue
              })
          });
    });

    rx
}

/// `max_file_size_mb` in bytes; 0 means unlimited.
fn size_limit(mb: Option<u64>) -> u64 {
    mb.unwrap_or(0).saturating_mul(1_048_576)
}

/// Every scannable file under `root`, sorted so the scan order is stable.
pub fn collect_paths(root: &Path, cfg: &Config) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = spawn_senders(root, cfg).into_iter().flatten().collect();
    paths.sort();
    tracing::debug!("{} source files under {}", paths.len(), root.display());
    paths
}

#[test]
fn collects_only_configured_extensions_outside_excluded_dirs() {
    let dir = tempfile::Builder::new().prefix("snare").tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("src/app")).unwrap();
    std::fs::create_dir_all(root.join("target/gen")).unwrap();
    std::fs::write(root.join("src/app/B.java"), "class B {}").unwrap();
    std::fs::write(root.join("src/A.java"), "class A {}").unwrap();
    std::fs::write(root.join("src/notes.txt"), "x").unwrap();
    std::fs::write(root.join("target/gen/C.java"), "class C {}").unwrap();

    let cfg = Config::default();
    let found: Vec<_> = collect_paths(root, &cfg)
        .into_iter()
        .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(found, vec!["src/A.java", "src/app/B.java"]);
}

#[test]
fn size_limit_saturates_instead_of_overflowing() {
    assert_eq!(size_limit(None), 0);
    assert_eq!(size_limit(Some(2)), 2 * 1_048_576);
    assert_eq!(size_limit(Some(u64::MAX / 2)), u64::MAX);
}
