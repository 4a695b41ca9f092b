use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const DEFAULT_API_URL: &str =
  "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 =
  30;

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "api.url".to_string(),
      DEFAULT_API_URL.to_string()
    );
    map.insert(
      "api.timeout".to_string(),
      DEFAULT_TIMEOUT_SECS.to_string()
    );
    map.insert(
      "data.location".to_string(),
      "~/.tasklane".to_string()
    );
    map.insert(
      "page.size".to_string(),
      crate::store::DEFAULT_PAGE_SIZE
        .to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rcfile_override
  ))]
  pub fn load(
    rcfile_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rcfile = resolve_rcfile_path(
      rcfile_override
    )?;
    if let Some(path) = rcfile {
      info!(rcfile = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    if let Ok(url) =
      std::env::var("TASKLANE_API_URL")
      && !url.trim().is_empty()
    {
      debug!(url = %url, "api url taken from environment");
      cfg.map.insert(
        "api.url".to_string(),
        url.trim().to_string()
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `Ok(None)` when the key is unset;
  /// an error when it is not a boolean.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|raw| {
        parse_bool(raw).ok_or_else(|| {
          anyhow!(
            "invalid boolean for \
             {key}: {raw}"
          )
        })
      })
      .transpose()
  }

  pub fn api_url(&self) -> String {
    self
      .get("api.url")
      .filter(|url| {
        !url.trim().is_empty()
      })
      .unwrap_or_else(|| {
        DEFAULT_API_URL.to_string()
      })
  }

  pub fn api_timeout(
    &self
  ) -> anyhow::Result<Duration> {
    let secs = self.get_u64(
      "api.timeout",
      DEFAULT_TIMEOUT_SECS
    )?;
    if secs == 0 {
      return Err(anyhow!(
        "api.timeout must be at least \
         one second"
      ));
    }
    Ok(Duration::from_secs(secs))
  }

  pub fn page_size(
    &self
  ) -> anyhow::Result<u64> {
    let size = self.get_u64(
      "page.size",
      crate::store::DEFAULT_PAGE_SIZE
    )?;
    if size == 0 {
      return Err(anyhow!(
        "page.size must be positive"
      ));
    }
    Ok(size)
  }

  fn get_u64(
    &self,
    key: &str,
    default: u64
  ) -> anyhow::Result<u64> {
    match self.map.get(key) {
      | Some(raw) => {
        raw.trim().parse::<u64>().with_context(
          || {
            format!(
              "invalid number for \
               {key}: {raw}"
            )
          }
        )
      }
      | None => Ok(default)
    }
  }

  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    self.load_nested(path, &mut Vec::new())
  }

  /// `chain` holds the canonical paths
  /// of the files currently being read,
  /// outermost first.
  #[tracing::instrument(skip(
    self, chain
  ))]
  fn load_nested(
    &mut self,
    path: &Path,
    chain: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    let canonical =
      fs::canonicalize(&path)
        .with_context(|| {
          format!(
            "failed to resolve {}",
            path.display()
          )
        })?;
    if chain.contains(&canonical) {
      return Err(anyhow!(
        "include cycle at {}",
        path.display()
      ));
    }
    chain.push(canonical);
    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line = strip_comment(raw_line);
      if line.is_empty() {
        continue;
      }

      if let Some(target) =
        line.strip_prefix("include ")
      {
        let target =
          resolve_include_path(
            &base_dir, target
          )?;
        if !target.exists() {
          warn!(include = %target.display(), "include file does not exist; skipping");
          continue;
        }
        debug!(
          from = %path.display(),
          include = %target.display(),
          line = idx + 1,
          "following include"
        );
        self.load_nested(
          &target, chain
        )?;
        continue;
      }

      let Some((key, value)) =
        line.split_once('=')
      else {
        return Err(anyhow!(
          "invalid config line {}:{}: \
           {raw_line}",
          path.display(),
          idx + 1
        ));
      };
      let (key, value) =
        (key.trim(), value.trim());
      trace!(key, value, "loaded config key");
      self.map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    chain.pop();
    Ok(())
  }
}

/// Drops a whole-line `#` comment or a
/// trailing ` #` one.
fn strip_comment(raw: &str) -> &str {
  let line = raw.trim();
  if line.starts_with('#') {
    return "";
  }
  line
    .split_once(" #")
    .map_or(line, |(kept, _)| {
      kept.trim_end()
    })
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rcfile_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("TASKLANERC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".tasklanerc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".tasklane"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  let include = include.trim();
  if include.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }
  let target =
    expand_tilde(Path::new(include));
  Ok(if target.is_absolute() {
    target
  } else {
    base_dir.join(target)
  })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => path.to_path_buf()
  }
}

fn parse_bool(
  raw: &str
) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use tempfile::tempdir;

  use super::Config;

  #[test]
  fn rc_file_with_include_and_comments()
  {
    let temp =
      tempdir().expect("tempdir");
    let extra =
      temp.path().join("extra.rc");
    std::fs::write(
      &extra,
      "page.size = 25\n"
    )
    .expect("write include");
    let main =
      temp.path().join("main.rc");
    std::fs::write(
      &main,
      "# backend\napi.url = \
       https://todo.example.com # \
       prod\napi.timeout=5\ninclude \
       extra.rc\ncolor=off\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&main))
      .expect("load config");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.get("api.url").as_deref(),
      Some("https://todo.example.com")
    );
    assert_eq!(
      cfg.api_timeout().expect("timeout"),
      Duration::from_secs(5)
    );
    assert_eq!(
      cfg.page_size().expect("page size"),
      25
    );
    assert_eq!(
      cfg
        .get_bool("color")
        .expect("color flag"),
      Some(false)
    );
  }

  #[test]
  fn overrides_strip_rc_prefix_and_validate()
   {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "rc.page.size".to_string(),
        "0".to_string()
      ),
      (
        "api.timeout".to_string(),
        "soon".to_string()
      ),
    ]);
    assert!(cfg.page_size().is_err());
    assert!(cfg.api_timeout().is_err());
  }

  #[test]
  fn include_cycles_are_rejected() {
    let temp =
      tempdir().expect("tempdir");
    let direct =
      temp.path().join("loop.rc");
    std::fs::write(
      &direct,
      "page.size=5\ninclude loop.rc\n"
    )
    .expect("write rc");
    let err = Config::load(Some(&direct))
      .expect_err("self include");
    assert!(
      err
        .to_string()
        .starts_with("include cycle at")
    );

    let a = temp.path().join("a.rc");
    let b = temp.path().join("b.rc");
    std::fs::write(&a, "include b.rc\n")
      .expect("write a");
    std::fs::write(&b, "include a.rc\n")
      .expect("write b");
    assert!(
      Config::load(Some(&a)).is_err()
    );
  }

  #[test]
  fn repeated_include_is_not_a_cycle()
  {
    let temp =
      tempdir().expect("tempdir");
    std::fs::write(
      temp.path().join("common.rc"),
      "color=off\n"
    )
    .expect("write common");
    let main =
      temp.path().join("main.rc");
    std::fs::write(
      &main,
      "include common.rc\ninclude \
       common.rc\n"
    )
    .expect("write main");
    let cfg = Config::load(Some(&main))
      .expect("load config");
    assert_eq!(cfg.loaded_files.len(), 3);
  }

  #[test]
  fn bad_boolean_is_an_error() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "color".to_string(),
      "maybe".to_string()
    )]);
    assert!(cfg.get_bool("color").is_err());
    assert_eq!(
      cfg
        .get_bool("missing")
        .expect("unset key"),
      None
    );
  }

  #[test]
  fn malformed_line_is_rejected() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("bad.rc");
    std::fs::write(&rc, "api.url\n")
      .expect("write rc");
    let err = Config::load(Some(&rc))
      .expect_err("missing '='");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }
}
