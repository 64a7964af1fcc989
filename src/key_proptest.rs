//! Property-based tests for key and URL derivation.
//!
//! These tests use proptest to generate random namespaces and names and
//! verify that the derived keys, paths and mirror URLs stay consistent.

#[cfg(test)]
mod proptest_tests {
    use crate::config::RegistryConfig;
    use crate::descriptor::RepoDescriptor;
    use crate::repository::resolve_fetch_url;
    use proptest::prelude::*;

    // Kubernetes-style object names
    const NAME: &str = "[a-z0-9]([a-z0-9-]{0,30}[a-z0-9])?";

    proptest! {
        /// Property: the key is exactly namespace and name joined by one slash
        #[test]
        fn key_splits_back_into_parts(namespace in NAME, name in NAME) {
            let key = RepoDescriptor::new(namespace.clone(), name.clone()).key();
            let parts: Vec<&str> = key.split('/').collect();
            prop_assert_eq!(parts, vec![namespace.as_str(), name.as_str()]);
        }

        /// Property: key derivation is deterministic
        #[test]
        fn key_is_deterministic(namespace in NAME, name in NAME) {
            let a = RepoDescriptor::new(namespace.clone(), name.clone()).key();
            let b = RepoDescriptor::new(namespace, name).key();
            prop_assert_eq!(a, b);
        }

        /// Property: committed and scratch trees never overlap
        #[test]
        fn data_and_load_paths_are_disjoint(namespace in NAME, name in NAME) {
            // Refused by Registry::add.
            prop_assume!(namespace != "load");
            let config = RegistryConfig::default().with_root_path("/data");
            let key = RepoDescriptor::new(namespace, name).key();
            let data = config.data_path(&key);
            let load = config.load_path(&key);
            prop_assert!(data.starts_with("/data"));
            prop_assert!(load.starts_with("/data/load"));
            prop_assert!(!data.starts_with(&load));
            prop_assert!(!load.starts_with(&data));
        }

        /// Property: the retired tree never overlaps any repository's trees
        #[test]
        fn retired_path_is_disjoint(namespace in NAME, name in NAME, other_ns in NAME, other_name in NAME) {
            let config = RegistryConfig::default().with_root_path("/data");
            let retired = config.retired_path(&RepoDescriptor::new(namespace, name).key());
            let other = RepoDescriptor::new(other_ns, other_name).key();
            for path in [config.data_path(&other), config.load_path(&other)] {
                prop_assert!(!retired.starts_with(&path));
                prop_assert!(!path.starts_with(&retired));
            }
        }

        /// Property: a configured mirror always overrides the artifact URL
        #[test]
        fn mirror_overrides_artifact_url(
            namespace in NAME,
            name in NAME,
            url in "https?://[a-z]{1,12}/[a-z0-9./-]{0,20}",
            host in "[a-z]{1,10}(\\.[a-z]{1,5})?",
        ) {
            let descriptor = RepoDescriptor::new(namespace.clone(), name.clone())
                .with_artifact(url.clone(), "rev");

            prop_assert_eq!(resolve_fetch_url(&descriptor, None).unwrap(), url);
            prop_assert_eq!(
                resolve_fetch_url(&descriptor, Some(host.as_str())).unwrap(),
                format!("http://{}/gitrepository/{}/{}/latest.tar.gz", host, namespace, name)
            );
        }

        /// Property: without an artifact no URL is ever produced
        #[test]
        fn missing_artifact_never_resolves(namespace in NAME, name in NAME, host in proptest::option::of("[a-z]{1,10}")) {
            let descriptor = RepoDescriptor::new(namespace, name);
            prop_assert!(resolve_fetch_url(&descriptor, host.as_deref()).is_err());
        }
    }
}
