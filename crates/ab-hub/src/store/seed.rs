//! Demo data for a fresh database: a default brand, the system account,
//! a handful of customer accounts with contacts, netblocks and domains,
//! and `tickets` tickets with events and notes.

use super::contacts::NewContact;
use super::{StoreResult, TicketForm, TicketStore};
use ab_core::{TicketType, CLASSIFICATIONS};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::net::{IpAddr, Ipv4Addr};

const CUSTOMERS: &[(&str, &str)] = &[
    ("Customer Internal", "hostmaster.example.net"),
    ("Webhosting Ltd", "webhosting.example.org"),
    ("Cloud Servers BV", "cloud.example.com"),
];

const SOURCES: &[&str] = &["spamcop", "shadowserver", "abusehub", "google safebrowsing"];

pub async fn seed_demo(store: &TicketStore, tickets: usize) -> StoreResult<()> {
    let mut rng = StdRng::from_entropy();

    let brand = store.create_brand("AbuseDesk", "Example Networks").await?;
    if store.system_account().await?.is_none() {
        store.create_account("Default", brand.id, true).await?;
    }

    let mut netblocks = Vec::new();
    for (i, (name, domain)) in CUSTOMERS.iter().enumerate() {
        let account = store.create_account(name, brand.id, false).await?;
        let email = format!("abuse@{domain}");
        let contact = store
            .create_contact(NewContact {
                reference: &format!("CUST{:03}", i + 1),
                name,
                email: Some(&email),
                auto_notify: rng.gen_bool(0.5),
                account_id: Some(account.id),
            })
            .await?;

        let first = Ipv4Addr::new(10, i as u8, 0, 0);
        let last = Ipv4Addr::new(10, i as u8, rng.gen_range(0..4), 255);
        store
            .create_netblock(
                contact.id,
                IpAddr::V4(first),
                IpAddr::V4(last),
                &format!("{name} range"),
                true,
            )
            .await?;
        store.create_domain(contact.id, domain).await?;
        netblocks.push((first, last, contact, *domain));
    }

    for _ in 0..tickets {
        let Some((first, last, contact, domain)) = netblocks.choose(&mut rng) else {
            break;
        };
        let lo = u32::from(*first);
        let hi = u32::from(*last);
        let ip = Ipv4Addr::from(rng.gen_range(lo..=hi));
        let (class_id, _) = CLASSIFICATIONS[rng.gen_range(0..CLASSIFICATIONS.len())];
        let ticket_type = TicketType::ALL[rng.gen_range(0..TicketType::ALL.len())];

        let form = TicketForm {
            ip: Some(ip.to_string()),
            domain: rng.gen_bool(0.5).then(|| format!("www.{domain}")),
            class_id: Some(class_id.to_string()),
            type_id: Some(ticket_type.as_str().to_string()),
            ip_contact_account_id: contact.account_id,
            ip_contact_reference: Some(contact.reference.clone()),
            ip_contact_name: Some(contact.name.clone()),
            ip_contact_email: contact.email.clone(),
            ip_contact_auto_notify: Some(contact.auto_notify),
            ..Default::default()
        };
        let ticket = store.create_ticket(&form).await?;

        let base = chrono::Utc::now().timestamp() - rng.gen_range(0..30 * 86_400);
        for n in 0..rng.gen_range(1..12) {
            let source = SOURCES[rng.gen_range(0..SOURCES.len())];
            store
                .add_event(
                    ticket.id,
                    source,
                    base + n * rng.gen_range(60..3_600),
                    &json!({ "reported_ip": ip.to_string(), "source": source }),
                )
                .await?;
        }
        if rng.gen_bool(0.3) {
            store
                .add_note(ticket.id, &contact.name, "We are looking into this.", false)
                .await?;
        }
    }

    tracing::info!(tickets, customers = CUSTOMERS.len(), "seeded demo data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_creates_resolvable_tickets() {
        let store = TicketStore::open_in_memory().unwrap();
        seed_demo(&store, 12).await.unwrap();

        let tickets = store.all_tickets().await.unwrap();
        assert_eq!(tickets.len(), 12);
        assert!(store.system_account().await.unwrap().is_some());

        for ticket in &tickets {
            assert!(ticket.event_count >= 1);
            let ip: IpAddr = ticket.ip.parse().unwrap();
            let owner = store.contact_for_ip(ip).await.unwrap().unwrap();
            assert_eq!(owner.account_id, ticket.ip_contact_account_id);
        }
    }
}
