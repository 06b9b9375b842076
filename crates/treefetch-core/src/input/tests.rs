//! Tests for inputs: parsing, overrides and the fetch algorithms.

use super::*;
use crate::attrs::attrs;
use crate::registry::InputSchemeRegistry;

const REV: &str = "0123456789abcdef0123456789abcdef01234567";
const OTHER_REV: &str = "89abcdef0123456789abcdef0123456789abcdef";

fn rev(text: &str) -> Hash {
    refs::parse_rev(text).unwrap()
}

fn parse(url: &str) -> Result<Input> {
    InputSchemeRegistry::with_default_schemes().input_from_url(url)
}

mod handle_tests {
    use super::*;

    #[test]
    fn no_overrides_returns_same_handle() {
        let input = parse("github:NixOS/nix/master").unwrap();
        let same = input.apply_overrides(None, None).unwrap();
        assert!(input.ptr_eq(&same));
    }

    #[test]
    fn rev_override_clears_ref() {
        let input = parse("github:NixOS/nix/master").unwrap();
        let pinned = input.apply_overrides(None, Some(rev(REV))).unwrap();

        assert!(!input.ptr_eq(&pinned));
        assert_eq!(pinned.get_ref(), None);
        assert_eq!(pinned.get_rev(), Some(&rev(REV)));
        assert!(pinned.is_immutable());
        assert_eq!(pinned.to_display_string(), format!("github:NixOS/nix/{REV}"));
        // The original is untouched.
        assert_eq!(input.get_ref(), Some("master"));
    }

    #[test]
    fn ref_override_clears_rev() {
        let input = parse(&format!("github:NixOS/nix/{REV}")).unwrap();
        let branch = input
            .apply_overrides(Some("release-2.3".into()), None)
            .unwrap();

        assert_eq!(branch.get_ref(), Some("release-2.3"));
        assert_eq!(branch.get_rev(), None);
        assert!(!branch.is_immutable());
    }

    #[test]
    fn both_overrides_conflict() {
        let input = parse("github:NixOS/nix").unwrap();
        let result = input.apply_overrides(Some("master".into()), Some(rev(REV)));
        assert!(matches!(result, Err(FetchError::ConflictingOverrides(_))));
    }

    #[test]
    fn overrides_keep_nar_hash() {
        let nar_hash = Hash::sha256(b"tree");
        let input = parse("github:NixOS/nix")
            .unwrap()
            .with_nar_hash(Some(nar_hash.clone()));
        let pinned = input.apply_overrides(None, Some(rev(REV))).unwrap();
        assert_eq!(pinned.nar_hash(), Some(&nar_hash));
    }

    #[test]
    fn equality_covers_variant_and_nar_hash() {
        let a = parse("github:NixOS/nix/master").unwrap();
        let b = parse("github:NixOS/nix?ref=master").unwrap();
        assert_eq!(a, b);

        let hashed = b.clone().with_nar_hash(Some(Hash::sha256(b"x")));
        assert_ne!(a, hashed);

        let git = parse("git+https://github.com/NixOS/nix?ref=master").unwrap();
        assert_ne!(a, git);
    }

    #[test]
    fn to_attrs_adds_type_and_nar_hash() {
        let nar_hash = Hash::sha256(b"tree");
        let input = parse(&format!("github:NixOS/nix/{REV}"))
            .unwrap()
            .with_nar_hash(Some(nar_hash.clone()));

        let mut expected = attrs([
            ("type", "github"),
            ("owner", "NixOS"),
            ("repo", "nix"),
            ("rev", REV),
        ]);
        expected.insert("narHash".into(), Attr::String(nar_hash.to_sri()));
        assert_eq!(input.to_attrs(), expected);
    }

    #[test]
    fn pinned_input_round_trips_through_attrs() {
        let registry = InputSchemeRegistry::with_default_schemes();
        for url in [
            format!("github:NixOS/nixpkgs/{REV}"),
            format!("git+https://example.com/repo.git?rev={REV}"),
        ] {
            let input = registry
                .input_from_url(&url)
                .unwrap()
                .with_nar_hash(Some(Hash::sha256(url.as_bytes())));
            let reparsed = registry.input_from_attrs(&input.to_attrs()).unwrap();
            assert_eq!(reparsed, input, "{url}");
        }
    }

    #[test]
    fn downcast_to_concrete_variant() {
        let input = parse("github:NixOS/nix").unwrap();
        assert!(input.downcast_ref::<GitHubInput>().is_some());
        assert!(input.downcast_ref::<GitInput>().is_none());
        assert_eq!(input.type_tag(), "github");
    }
}

mod github_parse_tests {
    use super::*;

    #[test]
    fn branch_in_path() {
        let input = parse("github:NixOS/nixpkgs/nixos-21.05").unwrap();
        let github = input.downcast_ref::<GitHubInput>().unwrap();

        assert_eq!(github.owner(), "NixOS");
        assert_eq!(github.repo(), "nixpkgs");
        assert_eq!(input.get_ref(), Some("nixos-21.05"));
        assert_eq!(input.get_rev(), None);
        assert!(!input.is_immutable());
        assert_eq!(input.to_display_string(), "github:NixOS/nixpkgs/nixos-21.05");
        assert_eq!(input.to_string(), "github:NixOS/nixpkgs/nixos-21.05");
    }

    #[test]
    fn commit_in_path() {
        let input = parse(&format!("github:NixOS/nix/{REV}")).unwrap();
        assert_eq!(input.get_rev(), Some(&rev(REV)));
        assert_eq!(input.get_ref(), None);
        assert!(input.is_immutable());
    }

    #[test]
    fn uppercase_commit_is_normalized() {
        let input = parse(&format!("github:NixOS/nix/{}", REV.to_uppercase())).unwrap();
        assert_eq!(input.to_display_string(), format!("github:NixOS/nix/{REV}"));
    }

    #[test]
    fn pointer_in_query() {
        let by_ref = parse("github:NixOS/nix?ref=release-2.3").unwrap();
        assert_eq!(by_ref.get_ref(), Some("release-2.3"));

        let by_rev = parse(&format!("github:NixOS/nix?rev={REV}")).unwrap();
        assert_eq!(by_rev.get_rev(), Some(&rev(REV)));
    }

    #[test]
    fn bare_repository() {
        let input = parse("github:NixOS/nix").unwrap();
        assert_eq!(input.get_ref(), None);
        assert_eq!(input.get_rev(), None);
        assert_eq!(input.to_display_string(), "github:NixOS/nix");
    }

    #[test]
    fn slashed_ref_displays_in_query_and_reparses() {
        let input = parse("github:NixOS/nix?ref=release/1.0").unwrap();
        assert_eq!(input.get_ref(), Some("release/1.0"));
        assert_eq!(input.to_display_string(), "github:NixOS/nix?ref=release/1.0");
        assert_eq!(parse(&input.to_display_string()).unwrap(), input);

        let overridden = parse("github:NixOS/nix")
            .unwrap()
            .apply_overrides(Some("feature/x".into()), None)
            .unwrap();
        let reparsed = parse(&overridden.to_display_string()).unwrap();
        assert_eq!(reparsed, overridden);
        assert_eq!(reparsed.get_ref(), Some("feature/x"));
    }

    #[test]
    fn other_query_parameters_are_ignored() {
        let input = parse("github:NixOS/nix?dir=subflake&ref=master").unwrap();
        assert_eq!(input.get_ref(), Some("master"));
    }

    #[test]
    fn wrong_segment_count_is_rejected() {
        for url in ["github:NixOS", "github:NixOS/nix/master/extra"] {
            assert!(matches!(parse(url), Err(FetchError::BadUrl(_))), "{url}");
        }
    }

    #[test]
    fn invalid_pointer_is_rejected() {
        for url in ["github:NixOS/nix/foo..bar", "github:NixOS/nix/branch.lock"] {
            assert!(matches!(parse(url), Err(FetchError::BadUrl(_))), "{url}");
        }
    }

    #[test]
    fn ref_and_rev_together_are_rejected() {
        let urls = [
            format!("github:o/r?ref=x&rev={REV}"),
            format!("github:o/r/{REV}?ref=x"),
            format!("github:o/r/x?rev={REV}"),
        ];
        for url in &urls {
            assert!(matches!(parse(url), Err(FetchError::BadUrl(_))), "{url}");
        }
    }

    #[test]
    fn duplicate_pointers_are_rejected() {
        let urls = [
            "github:o/r/main?ref=dev".to_string(),
            "github:o/r?ref=a&ref=b".to_string(),
            format!("github:o/r/{REV}?rev={OTHER_REV}"),
            format!("github:o/r?rev={REV}&rev={OTHER_REV}"),
        ];
        for url in &urls {
            assert!(matches!(parse(url), Err(FetchError::BadUrl(_))), "{url}");
        }
    }

    #[test]
    fn malformed_query_values_are_rejected() {
        for url in ["github:o/r?rev=abc", "github:o/r?ref=-bad"] {
            assert!(matches!(parse(url), Err(FetchError::BadUrl(_))), "{url}");
        }
    }

    #[test]
    fn attrs_form() {
        let registry = InputSchemeRegistry::with_default_schemes();
        let input = registry
            .input_from_attrs(&attrs([
                ("type", "github"),
                ("owner", "NixOS"),
                ("repo", "nix"),
                ("ref", "master"),
            ]))
            .unwrap();
        assert_eq!(input.to_display_string(), "github:NixOS/nix/master");
    }

    #[test]
    fn attrs_reject_unknown_keys() {
        let registry = InputSchemeRegistry::with_default_schemes();
        let result = registry.input_from_attrs(&attrs([
            ("type", "github"),
            ("owner", "NixOS"),
            ("repo", "nix"),
            ("dir", "sub"),
        ]));
        match result {
            Err(FetchError::UnsupportedAttribute { input_type, name }) => {
                assert_eq!(input_type, "github");
                assert_eq!(name, "dir");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn attrs_require_owner_and_repo() {
        let registry = InputSchemeRegistry::with_default_schemes();
        let result = registry.input_from_attrs(&attrs([("type", "github"), ("repo", "nix")]));
        assert!(matches!(result, Err(FetchError::MissingAttribute(name)) if name == "owner"));

        let mut wrong_type = attrs([("type", "github"), ("owner", "NixOS")]);
        wrong_type.insert("repo".into(), Attr::Int(3));
        assert!(matches!(
            registry.input_from_attrs(&wrong_type),
            Err(FetchError::AttributeType { .. })
        ));
    }

    #[test]
    fn attrs_reject_bad_rev() {
        let registry = InputSchemeRegistry::with_default_schemes();
        let result = registry.input_from_attrs(&attrs([
            ("type", "github"),
            ("owner", "o"),
            ("repo", "r"),
            ("rev", "not-a-hash"),
        ]));
        assert!(matches!(result, Err(FetchError::BadHash { .. })));
    }
}

mod git_parse_tests {
    use super::*;

    #[test]
    fn https_url_with_ref() {
        let input = parse("git+https://example.com/repo.git?ref=main").unwrap();
        let git = input.downcast_ref::<GitInput>().unwrap();

        assert_eq!(git.url(), "https://example.com/repo.git");
        assert_eq!(input.get_ref(), Some("main"));
        assert_eq!(input.type_tag(), "git");
        assert_eq!(
            input.to_display_string(),
            "git+https://example.com/repo.git?ref=main"
        );
    }

    #[test]
    fn display_reparses_to_equal_input() {
        for url in [
            "git+ssh://git@github.com/NixOS/nix.git".to_string(),
            "git+file:///srv/repo?ref=dev".to_string(),
            format!("git+http://example.com/r?rev={REV}"),
        ] {
            let input = parse(&url).unwrap();
            assert_eq!(parse(&input.to_display_string()).unwrap(), input, "{url}");
        }
    }

    #[test]
    fn unknown_transports_are_not_git_inputs() {
        for url in ["git+ftp://example.com/repo", "https://example.com/repo.git"] {
            assert!(
                matches!(parse(url), Err(FetchError::UnsupportedInput(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn ref_and_rev_together_are_rejected() {
        let url = format!("git+https://example.com/r?ref=main&rev={REV}");
        assert!(matches!(parse(&url), Err(FetchError::BadUrl(_))));
    }

    #[test]
    fn attrs_form() {
        let registry = InputSchemeRegistry::with_default_schemes();
        let input = registry
            .input_from_attrs(&attrs([
                ("type", "git"),
                ("url", "https://example.com/repo.git"),
                ("rev", REV),
            ]))
            .unwrap();
        assert!(input.is_immutable());
        assert_eq!(
            input.to_display_string(),
            format!("git+https://example.com/repo.git?rev={REV}")
        );

        let unknown = registry.input_from_attrs(&attrs([
            ("type", "git"),
            ("url", "https://example.com/repo.git"),
            ("submodules", "1"),
        ]));
        assert!(matches!(
            unknown,
            Err(FetchError::UnsupportedAttribute { .. })
        ));
    }
}

mod variant_contract_tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::Settings;
    use crate::download::HttpDownloader;
    use crate::store::{LocalStore, Store, StorePath};
    use tempfile::TempDir;

    /// A tree already in the store. Uses every default the trait offers.
    #[derive(Debug, Clone, PartialEq)]
    struct StoredTree {
        store_path: StorePath,
        /// NAR hash the resolved input claims, whatever the tree holds.
        claimed_nar_hash: Option<Hash>,
    }

    impl InputVariant for StoredTree {
        fn type_tag(&self) -> &'static str {
            "stored"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn equals(&self, other: &dyn InputVariant) -> bool {
            other
                .as_any()
                .downcast_ref::<Self>()
                .is_some_and(|other| self == other)
        }

        fn get_ref(&self) -> Option<&str> {
            None
        }

        fn get_rev(&self) -> Option<&Hash> {
            None
        }

        fn canonical_attrs(&self) -> Attrs {
            attrs([("path", self.store_path.to_string())])
        }

        fn to_display_string(&self) -> String {
            format!("stored:{}", self.store_path)
        }

        fn fetch_tree_internal(&self, _ctx: &FetchContext) -> Result<(Tree, Input)> {
            let resolved = Input::new(self.clone()).with_nar_hash(self.claimed_nar_hash.clone());
            Ok((Tree::new(self.store_path.clone(), None), resolved))
        }
    }

    struct Fixture {
        _dir: TempDir,
        ctx: FetchContext,
        store_path: StorePath,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path().join("store")).unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("default.nix"), "{ }\n").unwrap();
        let store_path = store.add_path("source", &src).unwrap();

        let cache_dir = dir.path().join("cache");
        let ctx = FetchContext::new(
            Arc::new(store),
            Arc::new(MemoryCache::new()),
            Arc::new(HttpDownloader::new(&cache_dir).unwrap()),
            Settings {
                cache_dir: Some(cache_dir),
                ..Settings::default()
            },
        );
        Fixture {
            _dir: dir,
            ctx,
            store_path,
        }
    }

    fn stored(f: &Fixture, claimed_nar_hash: Option<Hash>) -> Input {
        Input::new(StoredTree {
            store_path: f.store_path.clone(),
            claimed_nar_hash,
        })
    }

    #[test]
    fn default_with_override_is_unsupported() {
        let f = fixture();
        let input = stored(&f, None);

        match input.apply_overrides(Some("main".into()), None) {
            Err(FetchError::UnsupportedOverride { input: shown, value }) => {
                assert_eq!(shown, input.to_display_string());
                assert_eq!(value, "main");
            }
            other => panic!("expected UnsupportedOverride, got {other:?}"),
        }
        match input.apply_overrides(None, Some(rev(REV))) {
            Err(FetchError::UnsupportedOverride { value, .. }) => assert_eq!(value, REV),
            other => panic!("expected UnsupportedOverride, got {other:?}"),
        }
    }

    #[test]
    fn default_clone_to_is_unsupported() {
        let f = fixture();
        let dest = TempDir::new().unwrap();
        let result = stored(&f, None).clone_to(&f.ctx, &dest.path().join("checkout"));
        assert!(matches!(result, Err(FetchError::Other(_))));
    }

    #[test]
    fn fetch_fills_actual_path_and_nar_hash() {
        let f = fixture();
        let (tree, resolved) = stored(&f, None).fetch_tree(&f.ctx).unwrap();

        let recorded = f.ctx.store().query_path_info(&f.store_path).unwrap().nar_hash;
        assert_eq!(tree.actual_path, f.ctx.store().to_real_path(&f.store_path));
        assert_eq!(tree.info.nar_hash.as_ref(), Some(&recorded));
        assert_eq!(resolved.nar_hash(), Some(&recorded));
    }

    #[test]
    #[should_panic(expected = "disagrees with the NAR hash")]
    fn resolved_input_disagreeing_with_tree_panics() {
        let f = fixture();
        let _ = stored(&f, Some(Hash::sha256(b"some other tree"))).fetch_tree(&f.ctx);
    }
}

mod git_fetch_tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::Settings;
    use crate::download::HttpDownloader;
    use crate::git::tests::{commit_file, file_url, git_rev_parse, init_test_repo};
    use crate::store::LocalStore;
    use tempfile::TempDir;

    fn context(dir: &Path) -> FetchContext {
        context_with_ttl(dir, Settings::default().tarball_ttl)
    }

    fn context_with_ttl(dir: &Path, tarball_ttl: u64) -> FetchContext {
        let cache_dir = dir.join("cache");
        FetchContext::new(
            Arc::new(LocalStore::open(dir.join("store")).unwrap()),
            Arc::new(MemoryCache::new()),
            Arc::new(HttpDownloader::new(&cache_dir).unwrap()),
            Settings {
                cache_dir: Some(cache_dir),
                tarball_ttl,
                ..Settings::default()
            },
        )
    }

    #[test]
    fn fetch_local_repository() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let head = init_test_repo(&repo);
        let ctx = context(temp.path());

        let input = parse(&format!("git+{}?ref=main", file_url(&repo))).unwrap();
        let (tree, resolved) = input.fetch_tree(&ctx).unwrap();

        assert_eq!(resolved.get_rev(), Some(&rev(&head)));
        assert_eq!(resolved.get_ref(), None);
        assert!(tree.info.last_modified.is_some());
        assert!(tree.actual_path.join("README.md").exists());
        assert!(!tree.actual_path.join(".git").exists());
    }

    #[test]
    fn branch_resolution_is_cached() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let first = init_test_repo(&repo);
        let ctx = context(temp.path());
        let input = parse(&format!("git+{}", file_url(&repo))).unwrap();

        input.fetch_tree(&ctx).unwrap();
        commit_file(&repo, "later.txt", "later\n");
        let (_, resolved) = input.fetch_tree(&ctx).unwrap();

        assert_eq!(resolved.get_rev(), Some(&rev(&first)));
    }

    #[test]
    fn expired_branch_resolution_follows_new_commits() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let first = init_test_repo(&repo);
        // Every mutable entry is already stale.
        let ctx = context_with_ttl(temp.path(), 0);
        let input = parse(&format!("git+{}?ref=main", file_url(&repo))).unwrap();

        let (_, resolved) = input.fetch_tree(&ctx).unwrap();
        assert_eq!(resolved.get_rev(), Some(&rev(&first)));

        let second = commit_file(&repo, "later.txt", "later\n");
        let (tree, resolved) = input.fetch_tree(&ctx).unwrap();
        assert_eq!(resolved.get_rev(), Some(&rev(&second)));
        assert!(tree.actual_path.join("later.txt").exists());
    }

    #[test]
    fn pinned_fetch_of_older_commit() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let first = init_test_repo(&repo);
        commit_file(&repo, "later.txt", "later\n");
        let ctx = context(temp.path());

        let input = parse(&format!("git+{}?rev={first}", file_url(&repo))).unwrap();
        let (tree, resolved) = input.fetch_tree(&ctx).unwrap();

        assert_eq!(resolved.get_rev(), Some(&rev(&first)));
        assert!(!tree.actual_path.join("later.txt").exists());
    }

    #[test]
    fn same_content_lands_on_same_store_path() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let head = init_test_repo(&repo);
        let ctx = context(temp.path());

        let by_ref = parse(&format!("git+{}?ref=main", file_url(&repo))).unwrap();
        let by_rev = parse(&format!("git+{}?rev={head}", file_url(&repo))).unwrap();
        let (a, _) = by_ref.fetch_tree(&ctx).unwrap();
        let (b, _) = by_rev.fetch_tree(&ctx).unwrap();

        assert_eq!(a.store_path, b.store_path);
        assert_eq!(a.info.nar_hash, b.info.nar_hash);
    }

    #[test]
    fn clone_checks_out_pinned_commit() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let first = init_test_repo(&repo);
        commit_file(&repo, "later.txt", "later\n");
        let ctx = context(temp.path());

        let input = parse(&format!("git+{}?rev={first}", file_url(&repo))).unwrap();
        let dest = temp.path().join("work");
        input.clone_to(&ctx, &dest).unwrap();

        assert_eq!(git_rev_parse(&dest, "HEAD"), first);
    }
}
