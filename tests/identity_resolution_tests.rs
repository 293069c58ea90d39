// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity resolution tests.
//!
//! These tests verify that:
//! 1. The same external account always maps to the same user
//! 2. A new provider with a known email links to the existing user
//! 3. Concurrent identical assertions create exactly one user and one link

use identity_gateway::db::{IdentityRepository, MemoryRepository};
use identity_gateway::models::Provider;
use identity_gateway::services::IdentityResolver;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::assertion;

fn resolver(repo: &MemoryRepository) -> IdentityResolver {
    IdentityResolver::new(Arc::new(repo.clone()), Duration::from_secs(5))
}

#[tokio::test]
async fn test_same_subject_resolves_to_same_user() {
    let repo = MemoryRepository::new();
    let resolver = resolver(&repo);

    let first = resolver
        .resolve(assertion("github", "42", "a@x.com"))
        .await
        .unwrap();
    let second = resolver
        .resolve(assertion("github", "42", "a@x.com"))
        .await
        .unwrap();

    assert!(first.is_new_user);
    assert!(!second.is_new_user);
    assert_eq!(first.user.id, second.user.id);
    assert_eq!(repo.user_count().await, 1);
    assert_eq!(repo.link_count().await, 1);
}

#[tokio::test]
async fn test_github_then_google_same_email_is_one_user() {
    let repo = MemoryRepository::new();
    let resolver = resolver(&repo);

    let github = resolver
        .resolve(assertion("github", "42", "a@x.com"))
        .await
        .unwrap();
    let google = resolver
        .resolve(assertion("google", "109876", "a@x.com"))
        .await
        .unwrap();

    assert_eq!(github.user.id, google.user.id);
    assert!(!google.is_new_user);

    let links = repo.links_for_user(github.user.id).await;
    let providers: Vec<_> = links.iter().map(|l| l.provider.clone()).collect();
    assert_eq!(providers, vec![Provider::Github, Provider::Google]);
}

#[tokio::test]
async fn test_two_subjects_same_provider_same_user() {
    let repo = MemoryRepository::new();
    let resolver = resolver(&repo);

    let work = resolver
        .resolve(assertion("github", "1", "a@x.com"))
        .await
        .unwrap();
    let personal = resolver
        .resolve(assertion("github", "2", "a@x.com"))
        .await
        .unwrap();

    assert_eq!(work.user.id, personal.user.id);
    assert_eq!(repo.links_for_user(work.user.id).await.len(), 2);
}

#[tokio::test]
async fn test_link_refers_to_user_by_id() {
    let repo = MemoryRepository::new();
    let resolution = resolver(&repo)
        .resolve(assertion("msal", "ms-1", "a@contoso.com"))
        .await
        .unwrap();

    let link = repo
        .find_link(&Provider::Msal, "ms-1")
        .await
        .unwrap()
        .expect("link should exist");
    assert_eq!(link.user_id, resolution.user.id);

    let owner = repo.get_user(link.user_id).await.unwrap().unwrap();
    assert_eq!(owner.email, "a@contoso.com");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_assertions_create_one_user() {
    // Latency widens the window between lookup and write.
    let repo = MemoryRepository::with_latency(Duration::from_millis(5));
    let resolver = resolver(&repo);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move {
            resolver
                .resolve(assertion("github", "42", "a@x.com"))
                .await
        }));
    }

    let mut user_ids = Vec::new();
    let mut new_users = 0;
    for handle in handles {
        let resolution = handle.await.unwrap().unwrap();
        if resolution.is_new_user {
            new_users += 1;
        }
        user_ids.push(resolution.user.id);
    }

    user_ids.dedup();
    assert_eq!(user_ids.len(), 1, "all resolutions must agree on one user");
    assert_eq!(new_users, 1);
    assert_eq!(repo.user_count().await, 1);
    assert_eq!(repo.link_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_providers_same_email_create_one_user() {
    let repo = MemoryRepository::with_latency(Duration::from_millis(5));

    // Separate resolvers model separate instances: no shared in-process locks,
    // so only the repository's unique constraints prevent a duplicate.
    let github = resolver(&repo);
    let google = resolver(&repo);

    let a = tokio::spawn(async move {
        github
            .resolve(assertion("github", "42", "a@x.com"))
            .await
    });
    let b = tokio::spawn(async move {
        google
            .resolve(assertion("google", "g-1", "a@x.com"))
            .await
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_eq!(a.user.id, b.user.id);
    assert_eq!(repo.user_count().await, 1);
    assert_eq!(repo.link_count().await, 2);
}
