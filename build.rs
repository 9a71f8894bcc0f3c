use std::{fs, path::Path, process::Command, time::SystemTime};

fn main() {
  let now = SystemTime::now()
    .duration_since(SystemTime::UNIX_EPOCH)
    .map(|d| d.as_millis())
    .unwrap_or_default();
  println!("cargo:rustc-env=BUILD_TIME={}", now);

  println!("cargo:rerun-if-changed=.git/HEAD");
  if Path::new(".git/refs/heads").exists() {
    println!("cargo:rerun-if-changed=.git/refs/heads");
  }

  let (branch, commit) = git_info();
  println!("cargo:rustc-env=GIT_BRANCH={}", branch);
  println!("cargo:rustc-env=GIT_COMMIT={}", commit);
}

fn git(args: &[&str]) -> Option<String> {
  let output = Command::new("git").args(args).output().ok()?;
  if !output.status.success() {
    return None;
  }
  let value = String::from_utf8(output.stdout).ok()?.trim().to_string();
  (!value.is_empty()).then_some(value)
}

/// Branch and commit, falling back to reading `.git` when git is not installed.
fn git_info() -> (String, String) {
  let mut branch = git(&["rev-parse", "--abbrev-ref", "HEAD"]);
  let mut commit = git(&["rev-parse", "--short", "HEAD"]);

  if branch.is_none() || commit.is_none() {
    if let Ok(head) = fs::read_to_string(".git/HEAD") {
      match head.trim().strip_prefix("ref: ") {
        Some(ref_path) => {
          branch = branch.or_else(|| ref_path.rsplit('/').next().map(String::from));
          commit = commit.or_else(|| {
            fs::read_to_string(format!(".git/{}", ref_path))
              .ok()
              .map(|c| c.trim().chars().take(7).collect())
          });
        }
        None => commit = commit.or_else(|| Some(head.trim().chars().take(7).collect())),
      }
    }
  }

  (
    branch.unwrap_or_else(|| "unknown".to_string()),
    commit.unwrap_or_else(|| "unknown".to_string()),
  )
}
