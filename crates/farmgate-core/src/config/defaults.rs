//! Default configuration values

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "farmgate.yaml";

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "farmgate.toml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".farmgate.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_YAML,
        DEFAULT_CONFIG_TOML,
        ALT_CONFIG_FILE,
        ".farmgate.toml",
    ]
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# farmgate configuration

manifest:
  url: null
  branch: master
  remote: origin
  base_ref: "{remote}/{branch}"

workspace:
  root: hil-workspace
  results_dir: results
  archive_dir: artifacts
  venv_dir: .venv

runner:
  python: python3
  package: boardfarm
  binary: bft
  args: ["-b", "{board}", "--env-overlay", "{overlay}", "-c", "{config}", "-o", "{results_dir}"]
  module_flag: "-e"
  result_file: test_results.json
  extra_install: [setup.py, pyproject.toml]
  timeout_secs: null
  env: {}

selection:
  module_patterns: ["tests/**/*.py"]
  exclude: ["**/__init__.py"]
  search_depth: 3

node:
  required_labels: []
  labels_env: NODE_LABELS
"#;
