use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rhyme_finder::render::render_rhymes;
use rhyme_finder::{KeySelector, WordRecord, group_by, group_by_key};

fn rhyme_records(count: usize) -> Vec<WordRecord> {
    (0..count)
        .map(|i| {
            WordRecord::new(format!("word{i}"))
                .with_syllables((i % 6) as u32 + 1)
                .with_score((count - i) as u64)
        })
        .collect()
}

fn bench_grouping(c: &mut Criterion) {
    for &size in &[10usize, 100, 1_000] {
        let records = rhyme_records(size);
        c.bench_with_input(
            BenchmarkId::new("group_by_field", size),
            &records,
            |b, records| {
                b.iter(|| black_box(group_by(records.iter(), KeySelector::field("numSyllables"))));
            },
        );
        c.bench_with_input(
            BenchmarkId::new("group_by_key", size),
            &records,
            |b, records| {
                b.iter(|| black_box(group_by_key(records.iter(), |r| r.num_syllables)));
            },
        );
        c.bench_with_input(BenchmarkId::new("render_rhymes", size), &records, |b, records| {
            b.iter(|| black_box(render_rhymes(records)));
        });
    }
}

criterion_group!(benches, bench_grouping);
criterion_main!(benches);
