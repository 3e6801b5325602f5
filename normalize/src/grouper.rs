///
/// Partitions a sorted file list into `n` (or fewer) non-empty, balanced groups
/// whose concatenation, in some order, is exactly the input (§4.1).
///
/// Sorting lexicographically co-locates files that share a table-name prefix,
/// increasing the odds that one worker owns a table end-to-end, which is what
/// makes most schema deltas commute trivially (§5).
///
/// The source implementation's redistribution of surplus chunks uses index
/// arithmetic that's hard to prove correct for every `(len, n)` ratio (see the
/// "remainder redistribution" open question in the spec). This redistributes
/// the same way in spirit - surplus chunks get folded back into the earlier
/// groups - but round-robins file-by-file instead, which is trivially provable
/// to preserve every file exactly once and never produce more than `n` groups;
/// see the exhaustive P1/P2 tests below.
///
pub fn group_worker_files(files: &[String], n: usize) -> Vec<Vec<String>> {
    let n = n.max(1);

    let mut sorted: Vec<String> = files.to_vec();
    sorted.sort();

    if sorted.is_empty() {
        return Vec::new();
    }

    let chunk_size = (sorted.len() / n).max(1);
    let mut groups: Vec<Vec<String>> = sorted.chunks(chunk_size).map(|c| c.to_vec()).collect();

    while groups.len() > n {
        let overflow = groups.pop().expect("groups.len() > n implies at least one group");
        let remaining = groups.len();
        for (i, file) in overflow.into_iter().enumerate() {
            groups[i % remaining].push(file);
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("table{:03}.job{}.jsonl", i % 5, i)).collect()
    }

    #[test]
    fn p1_p2_hold_exhaustively_for_n_1_to_8_and_len_0_to_32() {
        for len in 0..=32usize {
            let input = files(len);
            for n in 1..=8usize {
                let groups = group_worker_files(&input, n);

                // P2: group bound.
                assert!(groups.len() <= n.max(1), "len={} n={} groups={}", len, n, groups.len());
                if len > 0 {
                    assert!(!groups.is_empty(), "len={} n={} produced zero groups", len, n);
                    for g in &groups {
                        assert!(!g.is_empty(), "len={} n={} produced an empty group", len, n);
                    }
                } else {
                    assert!(groups.is_empty());
                }

                // P1: grouping totality - concatenation (any order) is a permutation, no dupes.
                let mut flat: Vec<String> = groups.into_iter().flatten().collect();
                flat.sort();
                let mut expected = input.clone();
                expected.sort();
                assert_eq!(flat, expected, "len={} n={}", len, n);
            }
        }
    }

    #[test]
    fn single_group_when_n_is_one() {
        let input = files(7);
        let groups = group_worker_files(&input, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 7);
    }

    #[test]
    fn sorted_files_cluster_by_table_prefix() {
        let input = vec!["b.1.jsonl".to_string(), "a.2.jsonl".to_string(), "a.1.jsonl".to_string()];
        let groups = group_worker_files(&input, 1);
        assert_eq!(groups[0], vec!["a.1.jsonl", "a.2.jsonl", "b.1.jsonl"]);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_worker_files(&[], 4).is_empty());
    }
}
