// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, env var interpolation, and the launcher section.

use gantry::config::*;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let yaml = r#"
service: myapp
image: registry.example.com/team/myapp
source:
  url: https://git.example.com/team/myapp.git
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.service.as_str(), "myapp");
        assert_eq!(config.image.name(), "team/myapp");
        assert_eq!(config.source.branch, "main");
        assert_eq!(config.build.context, ".");
        assert_eq!(config.build.dockerfile, "Dockerfile");
        assert!(config.secret.is_none());
        assert!(config.registry.is_none());
        assert!(config.launcher.is_none());
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
service: chatbot
image: registry.example.com/team/chatbot

source:
  url: https://git.example.com/team/chatbot.git
  branch: release

build:
  context: .
  dockerfile: docker/Dockerfile

secret:
  source: /var/lib/ci/secrets/chatbot.env
  target: .env

registry:
  server: registry.example.com
  username:
    env: REGISTRY_USER
  password:
    env: REGISTRY_PASS

ports:
  - "8501:8501"

env:
  LOG_LEVEL: info

labels:
  team: platform

healthcheck:
  cmd: "curl -f http://localhost:8501/health"
  interval: 10s
  timeout: 5s
  retries: 3

health_timeout: 90s

restart: always

stop:
  timeout: 20s

launcher:
  app: "app:app"
  bind: "0.0.0.0:8501"
  workers: 4
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.branch, "release");
        assert_eq!(config.build.dockerfile, "docker/Dockerfile");
        assert_eq!(config.ports, vec!["8501:8501".to_string()]);
        assert_eq!(config.health_timeout, Duration::from_secs(90));
        assert_eq!(config.stop_timeout(), Duration::from_secs(20));

        let secret = config.secret.as_ref().unwrap();
        assert_eq!(secret.target, ".env");

        let healthcheck = config.healthcheck.as_ref().unwrap();
        assert_eq!(healthcheck.retries, 3);
        assert_eq!(healthcheck.interval, Duration::from_secs(10));

        let launcher = config.launcher.as_ref().unwrap();
        assert_eq!(launcher.workers, 4);
    }

    #[test]
    fn image_with_tag_is_rejected() {
        let yaml = r#"
service: myapp
image: registry.example.com/team/myapp:v3
source:
  url: https://git.example.com/team/myapp.git
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("repository"));
    }

    #[test]
    fn image_with_digest_is_rejected() {
        let yaml = r#"
service: myapp
image: registry.example.com/team/myapp@sha256:abc123
source:
  url: https://git.example.com/team/myapp.git
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn invalid_service_name_is_rejected() {
        let yaml = r#"
service: My_App
image: registry.example.com/team/myapp
source:
  url: https://git.example.com/team/myapp.git
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn restart_defaults_to_always() {
        let yaml = r#"
service: myapp
image: registry.example.com/team/myapp
source:
  url: https://git.example.com/team/myapp.git
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(matches!(config.restart, RestartPolicy::Always));
    }

    #[test]
    fn secret_target_defaults_to_dot_env() {
        let yaml = r#"
service: myapp
image: registry.example.com/team/myapp
source:
  url: https://git.example.com/team/myapp.git
secret:
  source:
    env: SECRET_ENV_FILE
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.secret.unwrap().target, ".env");
    }
}

mod env_interpolation {
    use super::*;

    #[test]
    fn literal_values_pass_through() {
        let value = EnvValue::Literal("plain".to_string());
        assert_eq!(value.resolve().unwrap(), "plain");
    }

    #[test]
    fn env_reference_resolves_from_environment() {
        temp_env::with_var("GANTRY_TEST_TOKEN", Some("sekrit"), || {
            let yaml = r#"
service: myapp
image: registry.example.com/team/myapp
source:
  url: https://git.example.com/team/myapp.git
env:
  TOKEN:
    env: GANTRY_TEST_TOKEN
"#;
            let config = Config::from_yaml(yaml).unwrap();
            let resolved = resolve_env_map(&config.env).unwrap();
            assert_eq!(resolved.get("TOKEN"), Some(&"sekrit".to_string()));
        });
    }

    #[test]
    fn missing_env_var_without_default_is_an_error() {
        temp_env::with_var_unset("GANTRY_TEST_MISSING", || {
            let value = EnvValue::FromEnv {
                var: "GANTRY_TEST_MISSING".to_string(),
                default: None,
            };
            assert!(value.resolve().is_err());
        });
    }

    #[test]
    fn missing_env_var_with_default_uses_default() {
        temp_env::with_var_unset("GANTRY_TEST_MISSING2", || {
            let value = EnvValue::FromEnv {
                var: "GANTRY_TEST_MISSING2".to_string(),
                default: Some("fallback".to_string()),
            };
            assert_eq!(value.resolve().unwrap(), "fallback");
        });
    }
}

mod launcher {
    use super::*;

    #[test]
    fn renders_full_server_invocation() {
        let yaml = r#"
service: chatbot
image: registry.example.com/team/chatbot
source:
  url: https://git.example.com/team/chatbot.git
launcher:
  app: "app:app"
  bind: "0.0.0.0:8501"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let command = config.launcher.unwrap().command();
        assert_eq!(
            command,
            vec![
                "gunicorn",
                "--workers",
                "3",
                "--bind",
                "0.0.0.0:8501",
                "--timeout",
                "120",
                "--log-level",
                "info",
                "app:app",
            ]
        );
    }

    #[test]
    fn overrides_replace_defaults() {
        let yaml = r#"
service: chatbot
image: registry.example.com/team/chatbot
source:
  url: https://git.example.com/team/chatbot.git
launcher:
  program: uvicorn
  app: "app:api"
  bind: "0.0.0.0:9000"
  workers: 8
  timeout: 30s
  log_level: debug
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let command = config.launcher.unwrap().command();
        assert_eq!(command[0], "uvicorn");
        assert_eq!(command[2], "8");
        assert_eq!(command[6], "30");
        assert_eq!(command[8], "debug");
    }
}

mod init {
    use super::*;

    #[test]
    fn template_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("my-service"), None, false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "my-service");
        assert!(config.secret.is_some());
        assert!(config.registry.is_some());
    }

    #[test]
    fn refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), None, None, false).unwrap();
        assert!(init_config(dir.path(), None, None, false).is_err());
        assert!(init_config(dir.path(), None, None, true).is_ok());
    }
}
