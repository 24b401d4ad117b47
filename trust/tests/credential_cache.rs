mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{millis, start, Harness, DAY, HOUR};
use trust::{assertion, AccountEvent, Error, RemoteError};

fn decode(h: &Harness, token: &str) -> (String, trust::AssertionClaims) {
    let key = h.cache.credentials().unwrap().key_pair.verifying_key();
    assertion::verify(token, &key).unwrap()
}

#[test]
fn assertion_timeline() {
    let mut h = Harness::new().signed_in("alice");

    let pending = h.request("audience.example.com");
    assert_eq!(h.signer.calls().len(), 1);
    assert_eq!(h.signer.calls()[0].0, "alice-sessionToken");
    h.signer.resolve(Ok("cert1"));
    let token = h.finish(pending).unwrap();

    let (cert, claims) = decode(&h, &token);
    assert_eq!(cert, "cert1");
    assert_eq!(claims.audience, "audience.example.com");
    assert_eq!(claims.expires_at, millis(start() + HOUR));
    let creds = h.cache.credentials().unwrap();
    assert_eq!(creds.key_pair.valid_until, start() + 30 * DAY);
    assert_eq!(creds.certificate.valid_until, start() + 6 * HOUR);

    // Same instant, new audience: no signing request
    let pending = h.request("other.example.com");
    h.finish(pending).unwrap();
    assert_eq!(h.signer.calls().len(), 1);

    // An hour later the certificate is still good
    h.clock.advance(HOUR);
    let pending = h.request("third.example.com");
    let token = h.finish(pending).unwrap();
    let (cert, claims) = decode(&h, &token);
    assert_eq!(cert, "cert1");
    assert_eq!(claims.audience, "third.example.com");
    assert_eq!(claims.expires_at, millis(start() + 2 * HOUR));
    assert_eq!(h.signer.calls().len(), 1);
    let creds = h.cache.credentials().unwrap();
    assert_eq!(creds.key_pair.valid_until, start() + 30 * DAY);
    assert_eq!(creds.certificate.valid_until, start() + 6 * HOUR);

    // Past the certificate lifetime but well within the key lifetime
    let now = start() + 7 * HOUR;
    h.clock.set(now);
    let pending = h.request("fourth.example.com");
    assert_eq!(h.signer.calls().len(), 2);
    h.signer.resolve(Ok("cert2"));
    let token = h.finish(pending).unwrap();
    let (cert, claims) = decode(&h, &token);
    assert_eq!(cert, "cert2");
    assert_eq!(claims.expires_at, millis(now + HOUR));
    let creds = h.cache.credentials().unwrap();
    assert_eq!(creds.key_pair.valid_until, now + 30 * DAY);
    assert_eq!(creds.certificate.valid_until, now + 6 * HOUR);

    // A new keypair was generated, not just a new certificate
    let calls = h.signer.calls();
    assert_ne!(calls[0].1, calls[1].1);
}

#[test]
fn lifetimes_run_from_trigger_not_from_callers() {
    let mut h = Harness::new().signed_in("alice");

    let first = h.request("a.example");
    h.clock.advance(HOUR / 6);
    let second = h.request("b.example");
    assert_eq!(h.signer.calls().len(), 1);

    h.signer.resolve(Ok("cert1"));
    h.finish(first).unwrap();
    let token = h.finish(second).unwrap();

    let creds = h.cache.credentials().unwrap();
    assert_eq!(creds.certificate.valid_until, start() + 6 * HOUR);
    assert_eq!(creds.key_pair.valid_until, start() + 30 * DAY);
    // The assertion itself is stamped at the time it is built
    let (_, claims) = decode(&h, &token);
    assert_eq!(claims.expires_at, millis(start() + HOUR / 6 + HOUR));
}

#[test]
fn generation_that_settles_expired_is_never_served() {
    let mut h = Harness::new().signed_in("alice");

    // Whoever triggered the generation gave up before it settled
    let abandoned = h.request("a.example");
    drop(abandoned);
    h.pool.run_until_stalled();
    h.signer.resolve(Ok("cert1"));

    let now = start() + 7 * HOUR;
    h.clock.set(now);
    let pending = h.request("b.example");
    assert_eq!(h.signer.calls().len(), 2);
    h.signer.resolve(Ok("cert2"));
    let token = h.finish(pending).unwrap();

    let (cert, _) = decode(&h, &token);
    assert_eq!(cert, "cert2");
    let creds = h.cache.credentials().unwrap();
    assert_eq!(creds.certificate.valid_until, now + 6 * HOUR);
    assert!(!h.cache.is_generating());
}

#[test]
fn slow_signer_outliving_certificate_triggers_regeneration() {
    let mut h = Harness::new().signed_in("alice");

    let pending = h.request("a.example");
    h.clock.advance(7 * HOUR);
    h.signer.resolve(Ok("cert1"));
    h.pool.run_until_stalled();
    assert_eq!(h.signer.calls().len(), 2);
    assert!(h.cache.credentials().is_none());

    h.signer.resolve(Ok("cert2"));
    let token = h.finish(pending).unwrap();
    let (cert, claims) = decode(&h, &token);
    assert_eq!(cert, "cert2");
    assert_eq!(claims.expires_at, millis(start() + 8 * HOUR));
}

#[test]
fn concurrent_callers_share_one_generation() {
    let mut h = Harness::new().signed_in("alice");
    let generated = Rc::new(RefCell::new(0));
    let counter = generated.clone();
    h.events.subscribe(move |e| {
        if matches!(e, AccountEvent::AssertionGenerated { .. }) {
            *counter.borrow_mut() += 1;
        }
    });

    let audiences = ["a.example", "b.example", "c.example", "d.example", "e.example"];
    let handles: Vec<_> = audiences.iter().map(|aud| h.request(aud)).collect();
    assert_eq!(h.signer.calls().len(), 1);
    assert_eq!(h.signer.pending(), 1);
    assert!(h.cache.is_generating());

    h.signer.resolve(Ok("cert1"));
    let tokens: Vec<String> = handles
        .into_iter()
        .map(|handle| h.finish(handle).unwrap())
        .collect();

    for (token, aud) in tokens.iter().zip(audiences.iter()) {
        let (cert, claims) = decode(&h, token);
        assert_eq!(cert, "cert1");
        assert_eq!(&claims.audience, aud);
    }
    assert_eq!(h.signer.calls().len(), 1);
    assert!(!h.cache.is_generating());
    assert_eq!(*generated.borrow(), 1);
}

#[test]
fn failure_reaches_every_waiter() {
    let mut h = Harness::new().signed_in("alice");

    let handles: Vec<_> = (0..3).map(|i| h.request(&format!("{}.example", i))).collect();
    h.signer.resolve(Err(RemoteError::Rejected("boom".into())));
    for handle in handles {
        assert_eq!(h.finish(handle), Err(Error::SigningFailed("boom".into())));
    }
    assert!(h.cache.credentials().is_none());
    assert!(!h.cache.is_generating());

    // Back to empty: the next request tries again
    let pending = h.request("a.example");
    assert_eq!(h.signer.calls().len(), 2);
    h.signer.resolve(Ok("cert2"));
    assert!(h.finish(pending).unwrap().starts_with("cert2~"));
}

#[test]
fn signer_offline_mid_request() {
    let mut h = Harness::new().signed_in("alice");

    let handles: Vec<_> = (0..2).map(|_| h.request("a.example")).collect();
    h.signer.resolve(Err(RemoteError::Offline));
    for handle in handles {
        assert_eq!(h.finish(handle), Err(Error::Offline));
    }
}

#[test]
fn sign_out_discards_in_flight_generation() {
    let mut h = Harness::new().signed_in("alice");

    let alice_request = h.request("a.example");
    assert_eq!(h.signer.pending(), 1);

    h.cache.sign_out();
    assert!(!h.cache.is_generating());
    h.cache.sign_in(common::session("bob"));
    let bob_request = h.request("b.example");
    assert_eq!(h.signer.calls().len(), 2);
    assert_eq!(h.signer.calls()[1].0, "bob-sessionToken");

    // Alice's certificate arrives late and must not land in Bob's cache
    h.signer.resolve(Ok("alice-cert"));
    assert_eq!(h.finish(alice_request), Err(Error::NoSession));
    assert!(h.cache.credentials().is_none());
    assert!(h.cache.is_generating());

    h.signer.resolve(Ok("bob-cert"));
    let token = h.finish(bob_request).unwrap();
    let (cert, claims) = decode(&h, &token);
    assert_eq!(cert, "bob-cert");
    assert_eq!(claims.audience, "b.example");
}

#[test]
fn sign_out_then_late_result_leaves_cache_empty() {
    let mut h = Harness::new().signed_in("alice");

    let pending = h.request("a.example");
    h.cache.sign_out();
    h.signer.resolve(Ok("cert1"));

    assert_eq!(h.finish(pending), Err(Error::NoSession));
    assert!(h.cache.credentials().is_none());
    assert!(h.cache.signed_in_user().is_none());
}
