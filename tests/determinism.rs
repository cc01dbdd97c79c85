//! Determinism guarantees of the canonicalizer and the fingerprints.

use devmesh::{canonicalize, log_hash, template_hash, CanonicalizeConfig};

const CORPUS: &[&str] = &[
    "hello 1234",
    "pid=17 open file /a",
    "Accepted password for alice from 10.0.0.9 port 50522 ssh2",
    "[UFW BLOCK] IN=eth0 SRC=45.33.1.2 DST=10.0.0.5 PROTO=TCP SPT=54321 DPT=22",
    "req 6ba7b810-9dad-11d1-80b4-00c04fd430c8 done in 1.234s",
    "wrote /home/alice/.cache/out.log at 2026-02-01T00:00:00Z",
    "(root) CMD (command -v debian-sa1 > /dev/null)",
    "peer fe80::1c2f:9aff:fe31:7b01 via 52:54:00:ab:cd:ef",
    "line one\r\nline\0two\twith   spaces",
];

#[test]
fn canonicalize_is_idempotent() {
    let cfg = CanonicalizeConfig::default();
    for message in CORPUS {
        let once = canonicalize(message, &cfg).unwrap();
        let twice = canonicalize(&once, &cfg).unwrap();
        assert_eq!(once, twice, "not idempotent for {message:?}");
    }
}

#[test]
fn canonicalize_is_stable_across_runs() {
    let cfg = CanonicalizeConfig::default();
    for message in CORPUS {
        let a = canonicalize(message, &cfg).unwrap();
        let b = canonicalize(message, &cfg).unwrap();
        assert_eq!(a, b, "output drifted for {message:?}");
    }
}

#[test]
fn canonical_output_is_free_of_control_characters() {
    let cfg = CanonicalizeConfig::default();
    for message in CORPUS {
        let out = canonicalize(message, &cfg).unwrap();
        assert!(
            out.chars().all(|c| !c.is_control()),
            "control characters survived in {out:?}"
        );
    }
}

#[test]
fn fingerprints_are_stable_and_well_formed() {
    for message in CORPUS {
        let event = log_hash(1_700_000_000_000_001, "sshd", "node-1", message);
        assert_eq!(event, log_hash(1_700_000_000_000_001, "sshd", "node-1", message));
        assert_eq!(event.len(), 32);
        assert!(event.chars().all(|c| c.is_ascii_hexdigit()));

        let template = template_hash("sshd", "INFO", 1, message);
        assert_eq!(template, template_hash("sshd", "INFO", 1, message));
        assert_eq!(template.len(), 32);
    }
}

#[test]
fn template_hash_separates_versions_and_services() {
    let v1 = template_hash("sshd", "INFO", 1, "hello <N>");
    assert_ne!(v1, template_hash("sshd", "INFO", 2, "hello <N>"));
    assert_ne!(v1, template_hash("nginx", "INFO", 1, "hello <N>"));
    assert_ne!(v1, template_hash("sshd", "ERROR", 1, "hello <N>"));
}

#[test]
fn representative_corpus_compresses() {
    let cfg = CanonicalizeConfig::default();
    let mut unique = std::collections::HashSet::new();
    let mut raw = 0usize;

    for node in 0..10 {
        for seq in 0..200 {
            let messages = [
                format!("Accepted password for user{node} from 10.0.{node}.{seq} port {}{seq}1 ssh2", node + 1),
                format!("worker pid={}{seq} finished batch {seq} of 5000", node + 1),
                format!("disk scrub of /home/user{node}/archive took {seq}.{node}s"),
            ];
            for message in messages {
                raw += 1;
                unique.insert(canonicalize(&message, &cfg).unwrap());
            }
        }
    }

    // The whole point: thousands of raw lines, a handful of templates.
    assert_eq!(raw, 6000);
    assert!(
        unique.len() <= 12,
        "uniqueness ratio too high: {} templates from {raw} lines",
        unique.len()
    );
}
