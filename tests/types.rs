// ABOUTME: Integration tests for type-safe identifiers and validated types.
// ABOUTME: Tests parsing, validation, and serialization of names, images and ids.

use bootstrapper::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn parse_simple_name() {
        let img = ImageRef::parse("postgres").unwrap();
        assert_eq!(img.repository(), "postgres");
        assert_eq!(img.tag(), Some("latest"));
        assert!(img.registry().is_none());
        assert!(img.digest().is_none());
    }

    #[test]
    fn parse_with_registry_and_org() {
        let img = ImageRef::parse("ghcr.io/example/chat-server:9.1").unwrap();
        assert_eq!(img.registry(), Some("ghcr.io"));
        assert_eq!(img.repository(), "example/chat-server");
        assert_eq!(img.tag(), Some("9.1"));
        assert_eq!(img.version(), "9.1");
    }

    #[test]
    fn org_without_registry_is_repository() {
        let img = ImageRef::parse("minio/minio:latest").unwrap();
        assert!(img.registry().is_none());
        assert_eq!(img.repository(), "minio/minio");
    }

    #[test]
    fn registry_with_port_keeps_tag() {
        let img = ImageRef::parse("localhost:5000/chat:dev").unwrap();
        assert_eq!(img.registry(), Some("localhost:5000"));
        assert_eq!(img.repository(), "chat");
        assert_eq!(img.tag(), Some("dev"));
    }

    #[test]
    fn parse_with_digest() {
        let img = ImageRef::parse("postgres@sha256:abc123").unwrap();
        assert_eq!(img.digest(), Some("sha256:abc123"));
        assert!(img.tag().is_none());
        assert_eq!(img.version(), "sha256:abc123");
    }

    #[test]
    fn display_round_trips() {
        let input = "ghcr.io/example/chat-server:9.1@sha256:abc123";
        assert_eq!(ImageRef::parse(input).unwrap().to_string(), input);
    }

    #[test]
    fn invalid_references_are_rejected() {
        assert!(matches!(ImageRef::parse(""), Err(ParseImageRefError::Empty)));
        assert!(matches!(
            ImageRef::parse("chat server"),
            Err(ParseImageRefError::InvalidChar(' '))
        ));
        assert!(matches!(
            ImageRef::parse("chat:"),
            Err(ParseImageRefError::InvalidFormat(_))
        ));
        assert!(matches!(
            ImageRef::parse("chat@"),
            Err(ParseImageRefError::InvalidFormat(_))
        ));
    }
}

mod resource_name_tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["chat", "chat-db", "a1", "x"] {
            assert!(ResourceName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn invalid_names() {
        assert_eq!(ResourceName::new(""), Err(ResourceNameError::Empty));
        assert_eq!(
            ResourceName::new("-chat"),
            Err(ResourceNameError::StartsWithHyphen)
        );
        assert_eq!(
            ResourceName::new("chat-"),
            Err(ResourceNameError::EndsWithHyphen)
        );
        assert_eq!(
            ResourceName::new("Chat"),
            Err(ResourceNameError::NotLowercase)
        );
        assert_eq!(
            ResourceName::new("chat_db"),
            Err(ResourceNameError::InvalidChar('_'))
        );
        assert!(matches!(
            ResourceName::new(&"a".repeat(64)),
            Err(ResourceNameError::TooLong(_))
        ));
    }

    #[test]
    fn deserialization_validates() {
        let ok: ResourceName = serde_json::from_str("\"chat\"").unwrap();
        assert_eq!(ok.as_str(), "chat");
        assert!(serde_json::from_str::<ResourceName>("\"Not Valid\"").is_err());
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn resource_ids_order_lexically() {
        let a = ResourceId::for_object("ConfigMap", Some("chat"), "chat-config");
        let b = ResourceId::for_object("Deployment", Some("chat"), "chat-server");
        assert!(a < b);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = ResourceId::for_object("Namespace", None, "chat");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"namespace/chat\"");

        let back: ResourceId = serde_json::from_str("\"namespace/chat\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn run_ids_are_distinct_from_resource_ids() {
        let run = RunId::new("run-1");
        assert_eq!(run.into_inner(), "run-1");
    }
}
