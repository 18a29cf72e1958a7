use attestor::ledger::memory::LedgerSnapshot;
use attestor::ledger::types::ResourceId;
use attestor::ledger::InMemoryLedger;
use std::fmt::Write as _;
use std::path::Path;

/// Show a simulated ledger state file
///
/// Lists the funding identity, every subject and every relationship with
/// the stake deposited behind it.
pub fn execute(ledger_state: String) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(&ledger_state);
    if !path.exists() {
        return Err(format!("Ledger state not found: {}", path.display()).into());
    }
    let ledger = InMemoryLedger::load(path)?;
    print!("{}", render_snapshot(&ledger.snapshot()));
    Ok(())
}

pub fn render_snapshot(snapshot: &LedgerSnapshot) -> String {
    let stake = |id: &ResourceId| snapshot.stakes.get(id).copied().unwrap_or(0);
    let mut out = String::new();

    let _ = writeln!(out, "📒 Ledger {}", snapshot.address);
    let _ = writeln!(out, "  Balance: {}", snapshot.balance);
    let _ = writeln!(
        out,
        "  Block height: {} (confirmation depth {})",
        snapshot.block_height, snapshot.confirmation_depth
    );
    let _ = writeln!(out, "  Transactions: {}", snapshot.transactions.len());

    let _ = writeln!(out);
    let _ = writeln!(out, "Subjects ({}):", snapshot.subjects.len());
    for (id, subject) in &snapshot.subjects {
        let _ = writeln!(
            out,
            "  {} {} <{}> stake {}",
            id,
            subject.descriptor.name,
            subject.descriptor.url,
            stake(&subject.stake_id)
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Relationships ({}):", snapshot.relationships.len());
    for (id, rel) in &snapshot.relationships {
        let name = |subject: &ResourceId| {
            snapshot
                .subjects
                .get(subject)
                .map_or_else(|| subject.to_string(), |s| s.descriptor.name.clone())
        };
        let _ = writeln!(
            out,
            "  {} {} -> {} stake {}",
            id,
            name(&rel.descriptor.subject_id),
            name(&rel.descriptor.object_id),
            stake(&rel.stake_id)
        );
    }
    out
}
